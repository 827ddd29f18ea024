//! Differentiable operations for tensors.
//!
//! Each operation:
//! 1. Computes the forward result
//! 2. Records a `GradFn` to the computation graph (if gradient tracking
//!    is enabled and any input requires gradients)
//!
//! The op set is tailored to hop-axis attention: batched matmuls treat
//! the leading axis as batch, shape ops move data between the
//! `[nodes, hops, embed]` and `[nodes * heads, hops, head_dim]` layouts,
//! and all ops tolerate zero-length axes so a single-hop sequence takes
//! the same code path as a long one.

use std::sync::Arc;

use super::grad_fn::{
    bmm_raw, matmul_raw, merge_heads_raw, split_heads_raw, transpose_last_raw, AddBackward,
    BmmBackward, BroadcastAddBackward, ConcatLastBackward, ExpandLastBackward, GradFn,
    MatmulBackward, MeanBackward, MergeHeadsBackward, MulBackward, Narrow1Backward, PowBackward,
    ReluBackward, Repeat1Backward, ScaleBackward, SoftmaxLastBackward, SplitHeadsBackward,
    SubBackward, Sum1Backward, SumBackward, TransposeLastBackward, ViewBackward,
};
use super::tensor::Tensor;
use super::{is_grad_enabled, with_graph};

/// Attach a grad function to `result` and record the op, if any input
/// participates in gradient computation.
pub(crate) fn track(result: &mut Tensor, grad_fn: Arc<dyn GradFn>, inputs: &[&Tensor]) {
    if !is_grad_enabled() || !inputs.iter().any(|t| t.requires_grad_enabled()) {
        return;
    }
    result.requires_grad_(true);
    result.set_grad_fn(grad_fn.clone());

    let output_id = result.id();
    with_graph(|graph| {
        for input in inputs {
            graph.register_tensor((*input).clone());
        }
        graph.record(output_id, grad_fn, inputs.iter().map(|t| t.id()).collect());
    });
}

impl Tensor {
    /// Element-wise addition of equal-shaped tensors.
    #[must_use]
    pub fn add(&self, other: &Tensor) -> Tensor {
        assert_eq!(
            self.shape(),
            other.shape(),
            "add() requires equal shapes, got {:?} and {:?}",
            self.shape(),
            other.shape()
        );
        let data: Vec<f32> = self
            .data()
            .iter()
            .zip(other.data().iter())
            .map(|(&a, &b)| a + b)
            .collect();
        let mut result = Tensor::new(&data, self.shape());
        track(&mut result, Arc::new(AddBackward), &[self, other]);
        result
    }

    /// Element-wise subtraction of equal-shaped tensors.
    #[must_use]
    pub fn sub(&self, other: &Tensor) -> Tensor {
        assert_eq!(
            self.shape(),
            other.shape(),
            "sub() requires equal shapes, got {:?} and {:?}",
            self.shape(),
            other.shape()
        );
        let data: Vec<f32> = self
            .data()
            .iter()
            .zip(other.data().iter())
            .map(|(&a, &b)| a - b)
            .collect();
        let mut result = Tensor::new(&data, self.shape());
        track(&mut result, Arc::new(SubBackward), &[self, other]);
        result
    }

    /// Element-wise multiplication of equal-shaped tensors.
    #[must_use]
    pub fn mul(&self, other: &Tensor) -> Tensor {
        assert_eq!(
            self.shape(),
            other.shape(),
            "mul() requires equal shapes, got {:?} and {:?}",
            self.shape(),
            other.shape()
        );
        let data: Vec<f32> = self
            .data()
            .iter()
            .zip(other.data().iter())
            .map(|(&a, &b)| a * b)
            .collect();
        let mut result = Tensor::new(&data, self.shape());
        track(
            &mut result,
            Arc::new(MulBackward {
                x: self.detach(),
                y: other.detach(),
            }),
            &[self, other],
        );
        result
    }

    /// Multiply every element by a scalar.
    #[must_use]
    pub fn scale(&self, factor: f32) -> Tensor {
        let data: Vec<f32> = self.data().iter().map(|&a| a * factor).collect();
        let mut result = Tensor::new(&data, self.shape());
        track(&mut result, Arc::new(ScaleBackward { factor }), &[self]);
        result
    }

    /// Element-wise power.
    #[must_use]
    pub fn pow(&self, n: f32) -> Tensor {
        let data: Vec<f32> = self.data().iter().map(|&a| a.powf(n)).collect();
        let mut result = Tensor::new(&data, self.shape());
        track(
            &mut result,
            Arc::new(PowBackward {
                x: self.detach(),
                n,
            }),
            &[self],
        );
        result
    }

    /// Rectified linear unit.
    #[must_use]
    pub fn relu(&self) -> Tensor {
        let data: Vec<f32> = self.data().iter().map(|&a| a.max(0.0)).collect();
        let mut result = Tensor::new(&data, self.shape());
        track(
            &mut result,
            Arc::new(ReluBackward { x: self.detach() }),
            &[self],
        );
        result
    }

    /// Sum of all elements, as a 1-element tensor.
    #[must_use]
    pub fn sum(&self) -> Tensor {
        let total: f32 = self.data().iter().sum();
        let mut result = Tensor::new(&[total], &[1]);
        track(
            &mut result,
            Arc::new(SumBackward {
                input_shape: self.shape().to_vec(),
            }),
            &[self],
        );
        result
    }

    /// Mean of all elements, as a 1-element tensor.
    #[must_use]
    pub fn mean(&self) -> Tensor {
        let n = self.numel();
        let total: f32 = self.data().iter().sum();
        let mean = if n == 0 { 0.0 } else { total / n as f32 };
        let mut result = Tensor::new(&[mean], &[1]);
        track(
            &mut result,
            Arc::new(MeanBackward {
                input_shape: self.shape().to_vec(),
            }),
            &[self],
        );
        result
    }

    /// 2-D matrix product: `[m, k] @ [k, n] -> [m, n]`.
    #[must_use]
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "matmul() lhs must be 2-D");
        assert_eq!(other.ndim(), 2, "matmul() rhs must be 2-D");
        let (m, k) = (self.shape()[0], self.shape()[1]);
        let (k2, n) = (other.shape()[0], other.shape()[1]);
        assert_eq!(
            k, k2,
            "matmul() inner dims must agree, got {k} and {k2}"
        );

        let data = matmul_raw(self.data(), other.data(), m, k, n);
        let mut result = Tensor::new(&data, &[m, n]);
        track(
            &mut result,
            Arc::new(MatmulBackward {
                a: self.detach(),
                b: other.detach(),
            }),
            &[self, other],
        );
        result
    }

    /// Batched 3-D matrix product: `[b, m, k] @ [b, k, n] -> [b, m, n]`.
    #[must_use]
    pub fn bmm(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 3, "bmm() lhs must be 3-D");
        assert_eq!(other.ndim(), 3, "bmm() rhs must be 3-D");
        let (batch, m, k) = (self.shape()[0], self.shape()[1], self.shape()[2]);
        assert_eq!(other.shape()[0], batch, "bmm() batch dims must agree");
        assert_eq!(other.shape()[1], k, "bmm() inner dims must agree");
        let n = other.shape()[2];

        let data = bmm_raw(self.data(), other.data(), batch, m, k, n);
        let mut result = Tensor::new(&data, &[batch, m, n]);
        track(
            &mut result,
            Arc::new(BmmBackward {
                a: self.detach(),
                b: other.detach(),
            }),
            &[self, other],
        );
        result
    }

    /// Transpose the last two axes of a 3-D tensor.
    #[must_use]
    pub fn transpose_last(&self) -> Tensor {
        assert_eq!(self.ndim(), 3, "transpose_last() expects a 3-D tensor");
        let (batch, m, n) = (self.shape()[0], self.shape()[1], self.shape()[2]);
        let data = transpose_last_raw(self.data(), batch, m, n);
        let mut result = Tensor::new(&data, &[batch, n, m]);
        track(&mut result, Arc::new(TransposeLastBackward), &[self]);
        result
    }

    /// Add a bias vector over the last axis: `[..., f] + [f]`.
    #[must_use]
    pub fn broadcast_add(&self, bias: &Tensor) -> Tensor {
        let f = bias.numel();
        assert_eq!(
            *self.shape().last().expect("non-scalar"),
            f,
            "broadcast_add() last axis must match bias length {f}"
        );
        let b = bias.data();
        let data: Vec<f32> = self
            .data()
            .iter()
            .enumerate()
            .map(|(i, &a)| a + b[i % f])
            .collect();
        let mut result = Tensor::new(&data, self.shape());
        track(
            &mut result,
            Arc::new(BroadcastAddBackward { bias_len: f }),
            &[self, bias],
        );
        result
    }

    /// Reshape to a new shape with the same number of elements.
    #[must_use]
    pub fn view(&self, shape: &[usize]) -> Tensor {
        let expected: usize = shape.iter().product();
        assert_eq!(
            self.numel(),
            expected,
            "view() cannot reshape {:?} to {:?}",
            self.shape(),
            shape
        );
        let mut result = Tensor::new(self.data(), shape);
        track(
            &mut result,
            Arc::new(ViewBackward {
                input_shape: self.shape().to_vec(),
            }),
            &[self],
        );
        result
    }

    /// Rearrange `[nodes, seq, heads * head_dim]` into
    /// `[nodes * heads, seq, head_dim]` for per-head batched attention.
    #[must_use]
    pub fn split_heads(&self, heads: usize) -> Tensor {
        assert_eq!(self.ndim(), 3, "split_heads() expects a 3-D tensor");
        let (nodes, seq, embed) = (self.shape()[0], self.shape()[1], self.shape()[2]);
        assert_eq!(
            embed % heads,
            0,
            "split_heads() embed dim {embed} must be divisible by {heads} heads"
        );
        let head_dim = embed / heads;
        let data = split_heads_raw(self.data(), nodes, heads, seq, head_dim);
        let mut result = Tensor::new(&data, &[nodes * heads, seq, head_dim]);
        track(
            &mut result,
            Arc::new(SplitHeadsBackward {
                nodes,
                heads,
                seq,
                head_dim,
            }),
            &[self],
        );
        result
    }

    /// Inverse of [`Tensor::split_heads`]: `[nodes * heads, seq, head_dim]`
    /// back to `[nodes, seq, heads * head_dim]`.
    #[must_use]
    pub fn merge_heads(&self, heads: usize) -> Tensor {
        assert_eq!(self.ndim(), 3, "merge_heads() expects a 3-D tensor");
        let (bh, seq, head_dim) = (self.shape()[0], self.shape()[1], self.shape()[2]);
        assert_eq!(
            bh % heads,
            0,
            "merge_heads() batch dim {bh} must be divisible by {heads} heads"
        );
        let nodes = bh / heads;
        let data = merge_heads_raw(self.data(), nodes, heads, seq, head_dim);
        let mut result = Tensor::new(&data, &[nodes, seq, heads * head_dim]);
        track(
            &mut result,
            Arc::new(MergeHeadsBackward {
                nodes,
                heads,
                seq,
                head_dim,
            }),
            &[self],
        );
        result
    }

    /// Numerically stable softmax along the last axis.
    #[must_use]
    pub fn softmax_last(&self) -> Tensor {
        let cols = *self.shape().last().expect("non-scalar");
        let rows = if cols == 0 { 0 } else { self.numel() / cols };
        let x = self.data();
        let mut data = vec![0.0f32; x.len()];

        for r in 0..rows {
            let off = r * cols;
            let row = &x[off..off + cols];
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut denom = 0.0f32;
            for j in 0..cols {
                let e = (row[j] - max).exp();
                data[off + j] = e;
                denom += e;
            }
            for j in 0..cols {
                data[off + j] /= denom;
            }
        }

        let mut result = Tensor::new(&data, self.shape());
        let output = result.detach();
        track(
            &mut result,
            Arc::new(SoftmaxLastBackward { output }),
            &[self],
        );
        result
    }

    /// Slice `len` entries starting at `start` along axis 1 of a 3-D tensor.
    #[must_use]
    pub fn narrow1(&self, start: usize, len: usize) -> Tensor {
        assert_eq!(self.ndim(), 3, "narrow1() expects a 3-D tensor");
        let (n, s, d) = (self.shape()[0], self.shape()[1], self.shape()[2]);
        assert!(
            start + len <= s,
            "narrow1() range {start}..{} out of bounds for axis of size {s}",
            start + len
        );
        let x = self.data();
        let mut data = vec![0.0f32; n * len * d];
        for i in 0..n {
            for j in 0..len {
                let src = (i * s + start + j) * d;
                let dst = (i * len + j) * d;
                data[dst..dst + d].copy_from_slice(&x[src..src + d]);
            }
        }
        let mut result = Tensor::new(&data, &[n, len, d]);
        track(
            &mut result,
            Arc::new(Narrow1Backward {
                input_shape: self.shape().to_vec(),
                start,
            }),
            &[self],
        );
        result
    }

    /// Repeat a `[n, 1, d]` tensor `times` times along axis 1.
    #[must_use]
    pub fn repeat1(&self, times: usize) -> Tensor {
        assert_eq!(self.ndim(), 3, "repeat1() expects a 3-D tensor");
        assert_eq!(self.shape()[1], 1, "repeat1() expects axis 1 of size 1");
        let (n, d) = (self.shape()[0], self.shape()[2]);
        let x = self.data();
        let mut data = vec![0.0f32; n * times * d];
        for i in 0..n {
            for j in 0..times {
                let dst = (i * times + j) * d;
                data[dst..dst + d].copy_from_slice(&x[i * d..(i + 1) * d]);
            }
        }
        let mut result = Tensor::new(&data, &[n, times, d]);
        track(&mut result, Arc::new(Repeat1Backward { times }), &[self]);
        result
    }

    /// Expand a `[n, s, 1]` tensor to `[n, s, times]` along the last axis.
    #[must_use]
    pub fn expand_last(&self, times: usize) -> Tensor {
        assert_eq!(self.ndim(), 3, "expand_last() expects a 3-D tensor");
        assert_eq!(self.shape()[2], 1, "expand_last() expects last axis of size 1");
        let (n, s) = (self.shape()[0], self.shape()[1]);
        let x = self.data();
        let mut data = vec![0.0f32; n * s * times];
        for r in 0..n * s {
            for t in 0..times {
                data[r * times + t] = x[r];
            }
        }
        let mut result = Tensor::new(&data, &[n, s, times]);
        track(&mut result, Arc::new(ExpandLastBackward { times }), &[self]);
        result
    }

    /// Concatenate two tensors along the last axis. Leading axes must match.
    #[must_use]
    pub fn concat_last(&self, other: &Tensor) -> Tensor {
        assert_eq!(
            self.shape()[..self.ndim() - 1],
            other.shape()[..other.ndim() - 1],
            "concat_last() leading axes must match"
        );
        let a_last = *self.shape().last().expect("non-scalar");
        let b_last = *other.shape().last().expect("non-scalar");
        let rows: usize = self.shape()[..self.ndim() - 1].iter().product();
        let out_last = a_last + b_last;

        let a = self.data();
        let b = other.data();
        let mut data = vec![0.0f32; rows * out_last];
        for r in 0..rows {
            let dst = r * out_last;
            data[dst..dst + a_last].copy_from_slice(&a[r * a_last..(r + 1) * a_last]);
            data[dst + a_last..dst + out_last]
                .copy_from_slice(&b[r * b_last..(r + 1) * b_last]);
        }

        let mut shape = self.shape().to_vec();
        *shape.last_mut().expect("non-scalar") = out_last;
        let mut result = Tensor::new(&data, &shape);
        track(
            &mut result,
            Arc::new(ConcatLastBackward {
                a_shape: self.shape().to_vec(),
                b_shape: other.shape().to_vec(),
            }),
            &[self, other],
        );
        result
    }

    /// Sum a 3-D tensor over axis 1: `[n, s, d] -> [n, d]`.
    #[must_use]
    pub fn sum1(&self) -> Tensor {
        assert_eq!(self.ndim(), 3, "sum1() expects a 3-D tensor");
        let (n, s, d) = (self.shape()[0], self.shape()[1], self.shape()[2]);
        let x = self.data();
        let mut data = vec![0.0f32; n * d];
        for i in 0..n {
            for j in 0..s {
                let src = (i * s + j) * d;
                for f in 0..d {
                    data[i * d + f] += x[src + f];
                }
            }
        }
        let mut result = Tensor::new(&data, &[n, d]);
        track(&mut result, Arc::new(Sum1Backward { seq: s }), &[self]);
        result
    }
}
