use super::*;

#[derive(Debug, Clone)]
pub struct TensorView<'a, V: TensorElement> {
    pub(super) mirror: &'a Tensor<V>,
    pub(super) offset: usize,
    pub(super) shape: Vec<usize>,
}

impl<'a, V: TensorElement> TensorView<'a, V> {
    /// Narrows the view down to its `ind`-th sub-tensor along the first axis.
    pub fn zoom(&mut self, ind: usize) -> Result<(), TensorError> {
        let len = *self
            .shape
            .first()
            .ok_or_else(|| TensorError::UnexpectedShape(self.shape.clone()))?;
        if ind >= len {
            return Err(TensorError::InvalidIndex {
                index: ind,
                size: len,
            });
        }
        let sub_size = self.size() / len;
        self.shape.remove(0);
        self.offset += sub_size * ind;
        Ok(())
    }
}

impl<V: TensorElement> From<TensorView<'_, V>> for Tensor<V> {
    fn from(view: TensorView<'_, V>) -> Tensor<V> {
        Tensor {
            blob: view.blob().to_vec(),
            shape: view.shape().to_vec(),
        }
    }
}

impl<V: TensorElement> TensorOps<V> for TensorView<'_, V> {
    fn tensor(&self) -> &Tensor<V> {
        self.mirror
    }
    fn offset(&self) -> usize {
        self.offset
    }
    fn shape(&self) -> &[usize] {
        &self.shape
    }
    fn blob(&self) -> &[V] {
        &self.mirror.blob[self.offset..self.offset + self.size()]
    }
}
