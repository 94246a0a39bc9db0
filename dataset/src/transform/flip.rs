use ndarray::{Array3, s};
use rand::Rng;

use super::Transform;
use crate::LoadErr;

/// Mirrors a `[C, H, W]` image left to right with probability `p`.
#[derive(Debug, Clone, Copy)]
pub struct RandomHorizontalFlip {
    p: f32,
}

impl RandomHorizontalFlip {
    pub fn new(p: f32) -> Self {
        Self { p }
    }
}

impl Default for RandomHorizontalFlip {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl<A: Clone + Send> Transform<Array3<A>> for RandomHorizontalFlip {
    type Output = Array3<A>;

    fn apply<R: Rng + ?Sized>(&self, input: Array3<A>, rng: &mut R) -> Result<Array3<A>, LoadErr> {
        if rng.random::<f32>() >= self.p {
            return Ok(input);
        }

        Ok(input.slice(s![.., .., ..;-1]).to_owned())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn image() -> Array3<u8> {
        Array::from_shape_fn((3, 2, 4), |(c, i, j)| (c * 100 + i * 10 + j) as u8)
    }

    #[test]
    fn always_flipping_is_an_exact_mirror() {
        let mut rng = StdRng::seed_from_u64(0);
        let flip = RandomHorizontalFlip::new(1.0);
        let x = image();

        let y = flip.apply(x.clone(), &mut rng).unwrap();
        for ((c, i, j), v) in y.indexed_iter() {
            assert_eq!(*v, x[[c, i, 3 - j]]);
        }

        let back = flip.apply(y, &mut rng).unwrap();
        assert_eq!(back, x);
    }

    #[test]
    fn never_flipping_is_the_identity() {
        let mut rng = StdRng::seed_from_u64(0);
        let flip = RandomHorizontalFlip::new(0.0);

        for _ in 0..20 {
            assert_eq!(flip.apply(image(), &mut rng).unwrap(), image());
        }
    }

    #[test]
    fn half_probability_flips_roughly_half_the_time() {
        let mut rng = StdRng::seed_from_u64(42);
        let flip = RandomHorizontalFlip::default();

        let flipped = (0..1000)
            .filter(|_| flip.apply(image(), &mut rng).unwrap() != image())
            .count();
        assert!((400..600).contains(&flipped), "{flipped}");
    }
}
