use crate::funcs::{Function, Loss};
use crate::optimizer::{Optimizer, OptimizerState};
use crate::tensor::*;
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

pub type TensorId = usize;

#[derive(Debug)]
struct Computation {
    inps: Vec<TensorId>,
    func: Box<dyn Function>,
}

/// Static computation graph.
///
/// Every tensor lives in a slot addressed by its [`TensorId`]. Slots produced
/// by [`Graph::call`] are recomputed by [`Graph::forward`] in allocation
/// order, which is also a topological order since a node can only consume
/// tensors allocated before it.
#[derive(Debug, Default)]
pub struct Graph {
    tensors: Vec<GeneralTensor>,
    grads: Vec<Tensor<f32>>,
    names: Vec<String>,
    computations: BTreeMap<TensorId, Computation>,
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("tensor error: {0}")]
    TensorError(#[from] TensorError),
    #[error("tensor with id {0} not found")]
    TensorNotFound(TensorId),
    #[error("no tensor named {0:?}")]
    UnknownName(String),
    #[error("tensor {0} is computed by the graph and cannot be loaded")]
    NotALeaf(TensorId),
}

fn add_grad(
    tensors: &[GeneralTensor],
    grads: &mut [Tensor<f32>],
    id: TensorId,
    add: Tensor<f32>,
) -> Result<(), GraphError> {
    let tensor = tensors.get(id).ok_or(GraphError::TensorNotFound(id))?;
    if !tensor.is_float() {
        return Ok(());
    }
    let grad = grads.get_mut(id).ok_or(GraphError::TensorNotFound(id))?;
    if grad.shape() != add.shape() {
        return Err(TensorError::ShapeError(grad.shape().to_vec(), add.shape().to_vec()).into());
    }
    for (g, a) in grad.blob_mut().iter_mut().zip(add.blob()) {
        *g += a;
    }
    Ok(())
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, t: GeneralTensor, name: String) -> TensorId {
        self.grads.push(Tensor::zeros(t.shape()));
        self.tensors.push(t);
        self.names.push(name);
        self.tensors.len() - 1
    }
    pub fn alloc(&mut self, t: Tensor<f32>, name: String) -> TensorId {
        self.push(GeneralTensor::Float(t), name)
    }
    pub fn alloc_usize(&mut self, t: Tensor<usize>, name: String) -> TensorId {
        self.push(GeneralTensor::Usize(t), name)
    }
    pub fn alloc_randn<R: Rng>(
        &mut self,
        rng: &mut R,
        shape: &[usize],
        std: f32,
        name: String,
    ) -> Result<TensorId, GraphError> {
        Ok(self.alloc(Tensor::randn(rng, shape, std)?, name))
    }

    fn check_leaf(&self, id: TensorId) -> Result<(), GraphError> {
        if id >= self.tensors.len() {
            return Err(GraphError::TensorNotFound(id));
        }
        if self.computations.contains_key(&id) {
            return Err(GraphError::NotALeaf(id));
        }
        Ok(())
    }
    /// Replaces the value of an input or parameter slot.
    pub fn load<T: TensorOps<f32>>(&mut self, id: TensorId, tensor: &T) -> Result<(), GraphError> {
        self.check_leaf(id)?;
        self.tensors[id] = GeneralTensor::Float(tensor.view().into());
        Ok(())
    }
    pub fn load_usize(&mut self, id: TensorId, tensor: Tensor<usize>) -> Result<(), GraphError> {
        self.check_leaf(id)?;
        self.tensors[id] = GeneralTensor::Usize(tensor);
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        for (g, t) in self.grads.iter_mut().zip(self.tensors.iter()) {
            if g.shape() == t.shape() {
                g.fill(0.);
            } else {
                *g = Tensor::zeros(t.shape());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
    pub fn name_of(&self, id: TensorId) -> Result<&str, GraphError> {
        self.names
            .get(id)
            .map(|s| s.as_str())
            .ok_or(GraphError::TensorNotFound(id))
    }
    pub fn id_of(&self, name: &str) -> Result<TensorId, GraphError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| GraphError::UnknownName(name.into()))
    }
    pub fn get(&self, id: TensorId) -> Result<&GeneralTensor, GraphError> {
        self.tensors.get(id).ok_or(GraphError::TensorNotFound(id))
    }
    pub fn get_float(&self, id: TensorId) -> Result<&Tensor<f32>, GraphError> {
        Ok(self.get(id)?.as_float()?)
    }
    pub fn get_grad(&self, id: TensorId) -> Result<&Tensor<f32>, GraphError> {
        self.grads.get(id).ok_or(GraphError::TensorNotFound(id))
    }

    /// Adds `f(inputs)` as a new node and evaluates it once.
    pub fn call(
        &mut self,
        mut f: Box<dyn Function>,
        tensor_ids: &[TensorId],
    ) -> Result<TensorId, GraphError> {
        let tensors = tensor_ids
            .iter()
            .map(|id| self.get(*id))
            .collect::<Result<Vec<_>, GraphError>>()?;
        let out = f.run(&tensors)?;
        let child = self.alloc(out, String::new());
        self.computations.insert(
            child,
            Computation {
                func: f,
                inps: tensor_ids.to_vec(),
            },
        );
        Ok(child)
    }

    pub fn forward(&mut self) -> Result<(), GraphError> {
        let Self {
            tensors,
            computations,
            ..
        } = self;
        for (out, c) in computations.iter_mut() {
            let result = {
                let inps = c
                    .inps
                    .iter()
                    .map(|id| tensors.get(*id).ok_or(GraphError::TensorNotFound(*id)))
                    .collect::<Result<Vec<_>, GraphError>>()?;
                c.func.run(&inps)?
            };
            tensors[*out] = GeneralTensor::Float(result);
        }
        Ok(())
    }

    /// Backpropagates `loss_fn` averaged over all positions of tensor `id`.
    /// Gradients accumulate on top of what is already stored, so call
    /// [`Graph::zero_grad`] first. Returns the mean loss.
    pub fn backward_all(&mut self, id: TensorId, loss_fn: Box<dyn Loss>) -> Result<f32, GraphError> {
        let Self {
            tensors,
            grads,
            computations,
            ..
        } = self;
        let output = tensors.get(id).ok_or(GraphError::TensorNotFound(id))?.as_float()?;
        let (loss, grad) = loss_fn.run(output)?;
        let mean_coeff = 1. / loss.size() as f32;
        add_grad(tensors, grads, id, grad.map_values(|g| g * mean_coeff))?;

        for (out, comp) in computations.iter().rev() {
            let inp_grads = {
                let inps = comp
                    .inps
                    .iter()
                    .map(|i| tensors.get(*i).ok_or(GraphError::TensorNotFound(*i)))
                    .collect::<Result<Vec<_>, GraphError>>()?;
                comp.func.grad(&inps, &grads[*out])?
            };
            for (inp, g) in comp.inps.iter().zip(inp_grads.into_iter()) {
                add_grad(tensors, grads, *inp, g)?;
            }
        }
        Ok(loss.mean())
    }

    pub fn optimize<O: Optimizer>(
        &mut self,
        opt: &O,
        state: &mut OptimizerState,
        params: &HashSet<TensorId>,
        learning_rate: f32,
    ) -> Result<(), GraphError> {
        let Self {
            tensors,
            grads,
            names,
            ..
        } = self;
        let mut named = HashMap::new();
        for (id, (tensor, grad)) in tensors.iter_mut().zip(grads.iter()).enumerate() {
            if params.contains(&id) {
                named.insert(names[id].clone(), (tensor.as_float_mut()?, grad));
            }
        }
        opt.step(named, state, learning_rate)?;
        Ok(())
    }
}
