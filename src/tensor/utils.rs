use super::*;

/// Numpy-style broadcast of two shapes, aligned from the right.
pub fn combine_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>, TensorError> {
    let shape_len = std::cmp::max(a.len(), b.len());
    let mut shape = vec![0; shape_len];
    for i in 0..shape_len {
        shape[shape_len - 1 - i] = if i >= a.len() {
            b[b.len() - 1 - i]
        } else if i >= b.len() {
            a[a.len() - 1 - i]
        } else {
            let (x, y) = (a[a.len() - 1 - i], b[b.len() - 1 - i]);
            if x == y || y == 1 {
                x
            } else if x == 1 {
                y
            } else {
                return Err(TensorError::ShapeError(a.to_vec(), b.to_vec()));
            }
        };
    }
    Ok(shape)
}

/// Position inside a (possibly broadcast) operand for a position of the result.
fn broadcast_pos(pos: &[usize], shape: &[usize]) -> Vec<usize> {
    pos[pos.len() - shape.len()..]
        .iter()
        .zip(shape.iter())
        .map(|(p, s)| if *s == 1 { 0 } else { *p })
        .collect()
}

fn unravel(mut i: usize, shape: &[usize]) -> Vec<usize> {
    let mut result = vec![0; shape.len()];
    for (r, s) in result.iter_mut().zip(shape.iter()).rev() {
        *r = i % s;
        i /= s;
    }
    result
}

fn ravel(pos: &[usize], shape: &[usize]) -> usize {
    pos.iter().zip(shape.iter()).fold(0, |acc, (p, s)| acc * s + p)
}

/// Broadcasts the leading (`dim - dims`) axes of both operands and applies `f`
/// to every pair of trailing `dims`-dimensional sub-tensors.
pub fn combine_map<V, W, X, T1, T2, F>(
    t1: &T1,
    t2: &T2,
    dims: usize,
    f: F,
) -> Result<Tensor<X>, TensorError>
where
    V: TensorElement,
    W: TensorElement,
    X: TensorElement,
    T1: TensorOps<V>,
    T2: TensorOps<W>,
    F: Fn(&TensorView<'_, V>, &TensorView<'_, W>) -> Result<Tensor<X>, TensorError> + Sync + Send,
{
    if t1.dim() < dims || t2.dim() < dims {
        return Err(TensorError::ShapeError(
            t1.shape().to_vec(),
            t2.shape().to_vec(),
        ));
    }
    let t1_outer = &t1.shape()[..t1.dim() - dims];
    let t2_outer = &t2.shape()[..t2.dim() - dims];
    let mut shape = combine_shapes(t1_outer, t2_outer)?;
    let works = shape.iter().product::<usize>();
    let tensors = (0..works)
        .into_par_iter()
        .map(|i| {
            let pos = unravel(i, &shape);
            let mut t1_view = t1.view();
            for p in broadcast_pos(&pos, t1_outer) {
                t1_view.zoom(p)?;
            }
            let mut t2_view = t2.view();
            for p in broadcast_pos(&pos, t2_outer) {
                t2_view.zoom(p)?;
            }
            f(&t1_view, &t2_view)
        })
        .collect::<Result<Vec<_>, TensorError>>()?;
    let t_shape = match tensors.first() {
        Some(t) => t.shape().to_vec(),
        None => return Err(TensorError::UnexpectedShape(shape)),
    };
    if tensors.iter().any(|t| t.shape() != t_shape.as_slice()) {
        return Err(TensorError::UnexpectedShape(t_shape));
    }
    let data = tensors.into_iter().flat_map(|t| t.into_blob()).collect();
    shape.extend(t_shape);
    Tensor::raw(&shape, data)
}

/// Elementwise binary operation with broadcasting.
pub fn combine<V, T1, T2, F>(t1: &T1, t2: &T2, f: F) -> Result<Tensor<V>, TensorError>
where
    V: TensorElement,
    T1: TensorOps<V>,
    T2: TensorOps<V>,
    F: Fn(V, V) -> V + Sync + Send,
{
    if t1.shape() == t2.shape() {
        let data = t1
            .blob()
            .par_iter()
            .zip(t2.blob().par_iter())
            .map(|(a, b)| f(*a, *b))
            .collect();
        return Tensor::raw(t1.shape(), data);
    }
    let shape = combine_shapes(t1.shape(), t2.shape())?;
    let (a, b) = (t1.blob(), t2.blob());
    let data = (0..shape.iter().product::<usize>())
        .into_par_iter()
        .map(|i| {
            let pos = unravel(i, &shape);
            let ia = ravel(&broadcast_pos(&pos, t1.shape()), t1.shape());
            let ib = ravel(&broadcast_pos(&pos, t2.shape()), t2.shape());
            f(a[ia], b[ib])
        })
        .collect();
    Tensor::raw(&shape, data)
}

/// Plain `[n, k] x [k, m]` product. Each output row is accumulated in order of `k`.
pub fn matmul_2d<T1: TensorOps<f32>, T2: TensorOps<f32>>(
    a: &T1,
    b: &T2,
) -> Result<Tensor<f32>, TensorError> {
    if a.dim() != 2 || b.dim() != 2 || a.shape()[1] != b.shape()[0] {
        return Err(TensorError::ShapeError(
            a.shape().to_vec(),
            b.shape().to_vec(),
        ));
    }
    let (n, k, m) = (a.shape()[0], a.shape()[1], b.shape()[1]);
    let (a, b) = (a.blob(), b.blob());
    let mut data = vec![0.; n * m];
    if m > 0 {
        data.par_chunks_mut(m).enumerate().for_each(|(i, row)| {
            for kk in 0..k {
                let av = a[i * k + kk];
                let b_row = &b[kk * m..(kk + 1) * m];
                for (r, bv) in row.iter_mut().zip(b_row.iter()) {
                    *r += av * bv;
                }
            }
        });
    }
    Tensor::raw(&[n, m], data)
}

/// Sums away the leading axes of `t` until it has the given `shape`.
/// Used when a broadcast operand needs its gradient back.
pub fn reduce_to_shape(t: &Tensor<f32>, shape: &[usize]) -> Result<Tensor<f32>, TensorError> {
    if t.shape() == shape {
        return Ok(t.clone());
    }
    if t.dim() < shape.len() {
        return Err(TensorError::ShapeError(t.shape().to_vec(), shape.to_vec()));
    }
    let extra = t.dim() - shape.len();
    let mut data = vec![0.; shape.iter().product()];
    if &t.shape()[extra..] == shape {
        if !data.is_empty() {
            for chunk in t.blob().chunks(data.len()) {
                for (d, v) in data.iter_mut().zip(chunk.iter()) {
                    *d += v;
                }
            }
        }
        return Tensor::raw(shape, data);
    }
    if t.shape()[extra..]
        .iter()
        .zip(shape.iter())
        .any(|(a, s)| *s != 1 && a != s)
    {
        return Err(TensorError::ShapeError(t.shape().to_vec(), shape.to_vec()));
    }
    for i in 0..t.size() {
        let pos = unravel(i, t.shape());
        let inner = broadcast_pos(&pos[extra..], shape);
        data[ravel(&inner, shape)] += t.blob()[i];
    }
    Tensor::raw(shape, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_shapes() {
        assert_eq!(combine_shapes(&[2, 3, 4], &[4]).unwrap(), vec![2, 3, 4]);
        assert_eq!(combine_shapes(&[2, 1, 4], &[3, 1]).unwrap(), vec![2, 3, 4]);
        assert!(combine_shapes(&[2, 3], &[4]).is_err());
    }

    #[test]
    fn test_combine_broadcast() {
        let a = Tensor::raw(&[2, 3], vec![1., 2., 3., 4., 5., 6.]).unwrap();
        let b = Tensor::vector(&[10., 20., 30.]);
        let c = combine(&a, &b, |x, y| x + y).unwrap();
        assert_eq!(c.blob(), &[11., 22., 33., 14., 25., 36.]);
    }

    #[test]
    fn test_matmul_2d() {
        let a = Tensor::raw(&[2, 3], vec![1., 2., 3., 4., 5., 6.]).unwrap();
        let b = Tensor::raw(&[3, 2], vec![7., 8., 9., 10., 11., 12.]).unwrap();
        let c = matmul_2d(&a, &b).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        assert_eq!(c.blob(), &[58., 64., 139., 154.]);
        assert!(matmul_2d(&a, &a).is_err());
    }

    #[test]
    fn test_reduce_to_shape() {
        let t = Tensor::raw(&[2, 2, 3], (0..12).map(|v| v as f32).collect()).unwrap();
        let r = reduce_to_shape(&t, &[3]).unwrap();
        assert_eq!(r.blob(), &[18., 22., 26.]);
        let r = reduce_to_shape(&t, &[2, 3]).unwrap();
        assert_eq!(r.blob(), &[6., 8., 10., 12., 14., 16.]);
    }
}
