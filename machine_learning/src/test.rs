#![cfg(test)]

use ndarray::{Array1, Array4};
use ndarray_rand::{RandomExt, rand_distr::Uniform};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    Device, Network,
    arch::{Architecture, Model, Sequential, layers::Layer},
    loss::{CrossEntropy, LossFn},
    optimization::Adam,
};

fn small_net() -> Sequential {
    Sequential::new([
        Layer::conv(2, 3, 3, 2),
        Layer::batch_norm(3),
        Layer::global_avg_pool(),
        Layer::dense((3, 4)),
    ])
}

fn inputs() -> (Array4<f32>, Array1<usize>) {
    let x = Array4::from_shape_fn((3, 2, 5, 5), |(n, c, i, j)| {
        ((n * 7 + c * 3 + i * 5 + j * 2) % 13) as f32 * 0.15 - 0.9
    });
    (x, Array1::from(vec![1, 3, 0]))
}

fn loss_at(model: &mut Sequential, params: &[f32], x: &Array4<f32>, labels: &Array1<usize>) -> f32 {
    let logits = model.forward(params, x.clone()).unwrap();
    CrossEntropy.loss(logits.view(), labels.view()).unwrap()
}

#[test]
fn test_ml_gradient_matches_finite_differences() {
    let mut model = small_net();
    let mut params = vec![0.0; Model::size(&model)];
    let mut rng = StdRng::seed_from_u64(11);
    model.init(&mut params, &mut rng).unwrap();

    let (x, labels) = inputs();
    let logits = model.forward(&params, x.clone()).unwrap();
    let d = CrossEntropy.loss_prime(logits.view(), labels.view()).unwrap();
    let mut grad = vec![0.0; params.len()];
    model.backward(&params, &mut grad, d).unwrap();

    let eps = 1e-2;
    for i in (0..params.len()).step_by(5) {
        let mut plus = params.clone();
        plus[i] += eps;
        let mut minus = params.clone();
        minus[i] -= eps;

        let numeric =
            (loss_at(&mut model, &plus, &x, &labels) - loss_at(&mut model, &minus, &x, &labels))
                / (2.0 * eps);

        assert!(
            (numeric - grad[i]).abs() < 5e-3 + 5e-2 * numeric.abs(),
            "param {i}: numeric {numeric} vs analytic {}",
            grad[i]
        );
    }
}

#[test]
fn test_ml_resnet_overfits_a_single_batch() {
    let model = Architecture::ResNet18.build(3);
    let mut rng = StdRng::seed_from_u64(5);
    let mut net = Network::new(model, Device::Cpu, &mut rng).unwrap();
    let mut adam = Adam::new(net.size(), 1e-3);

    let x = Array4::random_using((3, 3, 32, 32), Uniform::new(0.0, 1.0).unwrap(), &mut rng);
    let labels = Array1::from(vec![0, 1, 2]);

    let first = net
        .train_step(x.clone(), labels.view(), Device::Cpu, &CrossEntropy, &mut adam)
        .unwrap();
    let mut last = first;
    for _ in 0..5 {
        last = net
            .train_step(x.clone(), labels.view(), Device::Cpu, &CrossEntropy, &mut adam)
            .unwrap();
    }

    assert!(last.is_finite());
    assert!(last < first, "{last} >= {first}");
}
