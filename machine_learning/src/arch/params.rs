use std::mem;

/// Walks a flat parameter buffer front to back, handing out one slice per layer.
pub(crate) struct FrontIter<'p> {
    params: &'p [f32],
}

impl<'p> FrontIter<'p> {
    pub fn new(params: &'p [f32]) -> Self {
        Self { params }
    }

    /// Takes the next `n` parameters.
    ///
    /// # Returns
    /// A slice of parameters or `None` if there are less than `n` left.
    pub fn take(&mut self, n: usize) -> Option<&'p [f32]> {
        if n > self.params.len() {
            return None;
        }

        let (head, tail) = self.params.split_at(n);
        self.params = tail;
        Some(head)
    }
}

/// Same as `FrontIter` but over a mutable buffer, used when initializing parameters.
pub(crate) struct FrontIterMut<'p> {
    params: &'p mut [f32],
}

impl<'p> FrontIterMut<'p> {
    pub fn new(params: &'p mut [f32]) -> Self {
        Self { params }
    }

    pub fn take(&mut self, n: usize) -> Option<&'p mut [f32]> {
        if n > self.params.len() {
            return None;
        }

        let (head, tail) = mem::take(&mut self.params).split_at_mut(n);
        self.params = tail;
        Some(head)
    }
}

/// Walks the parameters and the gradient back to front, handing out the slices of the
/// layer that is being back propagated.
pub(crate) struct BackIter<'p, 'g> {
    params: &'p [f32],
    grad: &'g mut [f32],
}

impl<'p, 'g> BackIter<'p, 'g> {
    /// Creates a new `BackIter`.
    ///
    /// Both buffers are expected to have the same length.
    pub fn new(params: &'p [f32], grad: &'g mut [f32]) -> Self {
        Self { params, grad }
    }

    /// Takes the last `n` parameters and their gradient.
    ///
    /// # Returns
    /// The pair of slices or `None` if there are less than `n` left.
    pub fn take(&mut self, n: usize) -> Option<(&'p [f32], &'g mut [f32])> {
        if n > self.params.len() || n > self.grad.len() {
            return None;
        }

        let (params, tail) = self.params.split_at(self.params.len() - n);
        self.params = params;

        let grad = mem::take(&mut self.grad);
        let at = grad.len() - n;
        let (grad, grad_tail) = grad.split_at_mut(at);
        self.grad = grad;

        Some((tail, grad_tail))
    }
}
