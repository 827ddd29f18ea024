//! Gradient function trait and implementations.
//!
//! Each differentiable operation implements `GradFn` to define how
//! gradients flow backward through it. The op set here is exactly what
//! the hop-attention model needs; shapes are validated by the forward
//! ops, so the backward passes assume consistent inputs.

use super::tensor::Tensor;

/// Trait for functions that compute gradients during the backward pass.
///
/// Each differentiable operation creates a `GradFn` implementation that
/// captures the context needed for gradient computation.
///
/// For element-wise addition z = x + y:
/// - ∂z/∂x = 1
/// - ∂z/∂y = 1
///
/// so `backward(grad_output)` returns `[grad_output, grad_output]`.
pub trait GradFn: Send + Sync {
    /// Compute gradients with respect to inputs.
    ///
    /// Returns one gradient per input tensor, in the input order used
    /// during the forward pass.
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor>;

    /// Human-readable name for debugging.
    fn name(&self) -> &'static str;
}

// ============================================================================
// Raw kernels shared by forward ops and backward passes (not recorded)
// ============================================================================

/// Plain 2-D matrix product: [m, k] x [k, n] -> [m, n].
pub(crate) fn matmul_raw(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        for p in 0..k {
            let av = a[i * k + p];
            if av == 0.0 {
                continue;
            }
            let row = &b[p * n..(p + 1) * n];
            let dst = &mut out[i * n..(i + 1) * n];
            for (o, &bv) in dst.iter_mut().zip(row.iter()) {
                *o += av * bv;
            }
        }
    }
    out
}

/// Batched 3-D matrix product: [batch, m, k] x [batch, k, n] -> [batch, m, n].
pub(crate) fn bmm_raw(
    a: &[f32],
    b: &[f32],
    batch: usize,
    m: usize,
    k: usize,
    n: usize,
) -> Vec<f32> {
    let mut out = vec![0.0f32; batch * m * n];
    for bi in 0..batch {
        let a_off = bi * m * k;
        let b_off = bi * k * n;
        let o_off = bi * m * n;
        for i in 0..m {
            for p in 0..k {
                let av = a[a_off + i * k + p];
                if av == 0.0 {
                    continue;
                }
                for j in 0..n {
                    out[o_off + i * n + j] += av * b[b_off + p * n + j];
                }
            }
        }
    }
    out
}

/// Batched transpose of the last two axes: [batch, m, n] -> [batch, n, m].
pub(crate) fn transpose_last_raw(x: &[f32], batch: usize, m: usize, n: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; batch * m * n];
    for bi in 0..batch {
        let off = bi * m * n;
        for i in 0..m {
            for j in 0..n {
                out[off + j * m + i] = x[off + i * n + j];
            }
        }
    }
    out
}

// ============================================================================
// Element-wise operations
// ============================================================================

/// Gradient function for addition of equal-shaped tensors: z = x + y
pub(crate) struct AddBackward;

impl GradFn for AddBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![grad_output.clone(), grad_output.clone()]
    }

    fn name(&self) -> &'static str {
        "AddBackward"
    }
}

/// Gradient function for subtraction: z = x - y
pub(crate) struct SubBackward;

impl GradFn for SubBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let neg: Vec<f32> = grad_output.data().iter().map(|&g| -g).collect();
        vec![
            grad_output.clone(),
            Tensor::new(&neg, grad_output.shape()),
        ]
    }

    fn name(&self) -> &'static str {
        "SubBackward"
    }
}

/// Gradient function for element-wise multiplication: z = x * y
pub(crate) struct MulBackward {
    pub(crate) x: Tensor,
    pub(crate) y: Tensor,
}

impl GradFn for MulBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let grad_x: Vec<f32> = grad_output
            .data()
            .iter()
            .zip(self.y.data().iter())
            .map(|(&g, &y)| g * y)
            .collect();
        let grad_y: Vec<f32> = grad_output
            .data()
            .iter()
            .zip(self.x.data().iter())
            .map(|(&g, &x)| g * x)
            .collect();
        vec![
            Tensor::new(&grad_x, grad_output.shape()),
            Tensor::new(&grad_y, grad_output.shape()),
        ]
    }

    fn name(&self) -> &'static str {
        "MulBackward"
    }
}

/// Gradient function for scalar scaling: z = c * x
pub(crate) struct ScaleBackward {
    pub(crate) factor: f32,
}

impl GradFn for ScaleBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let grad: Vec<f32> = grad_output.data().iter().map(|&g| g * self.factor).collect();
        vec![Tensor::new(&grad, grad_output.shape())]
    }

    fn name(&self) -> &'static str {
        "ScaleBackward"
    }
}

/// Gradient function for pow: z = x^n
pub(crate) struct PowBackward {
    pub(crate) x: Tensor,
    pub(crate) n: f32,
}

impl GradFn for PowBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let grad: Vec<f32> = grad_output
            .data()
            .iter()
            .zip(self.x.data().iter())
            .map(|(&g, &x)| g * self.n * x.powf(self.n - 1.0))
            .collect();
        vec![Tensor::new(&grad, grad_output.shape())]
    }

    fn name(&self) -> &'static str {
        "PowBackward"
    }
}

/// Gradient function for `ReLU`: z = max(0, x)
pub(crate) struct ReluBackward {
    pub(crate) x: Tensor,
}

impl GradFn for ReluBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let grad: Vec<f32> = grad_output
            .data()
            .iter()
            .zip(self.x.data().iter())
            .map(|(&g, &x)| if x > 0.0 { g } else { 0.0 })
            .collect();
        vec![Tensor::new(&grad, grad_output.shape())]
    }

    fn name(&self) -> &'static str {
        "ReluBackward"
    }
}

// ============================================================================
// Reductions
// ============================================================================

/// Gradient function for sum: z = sum(x)
pub(crate) struct SumBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for SumBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let g = grad_output.item();
        let numel: usize = self.input_shape.iter().product();
        vec![Tensor::new(&vec![g; numel], &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "SumBackward"
    }
}

/// Gradient function for mean: z = mean(x)
pub(crate) struct MeanBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for MeanBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let g = grad_output.item();
        let numel: usize = self.input_shape.iter().product();
        let grad_val = if numel == 0 { 0.0 } else { g / numel as f32 };
        vec![Tensor::new(&vec![grad_val; numel], &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "MeanBackward"
    }
}

// ============================================================================
// Matrix products
// ============================================================================

/// Gradient function for 2-D matmul: z = a @ b
pub(crate) struct MatmulBackward {
    pub(crate) a: Tensor,
    pub(crate) b: Tensor,
}

impl GradFn for MatmulBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let (m, k) = (self.a.shape()[0], self.a.shape()[1]);
        let n = self.b.shape()[1];

        // grad_a = g @ b^T, grad_b = a^T @ g
        let b_t = transpose_last_raw(self.b.data(), 1, k, n);
        let grad_a = matmul_raw(grad_output.data(), &b_t, m, n, k);

        let a_t = transpose_last_raw(self.a.data(), 1, m, k);
        let grad_b = matmul_raw(&a_t, grad_output.data(), k, m, n);

        vec![
            Tensor::new(&grad_a, &[m, k]),
            Tensor::new(&grad_b, &[k, n]),
        ]
    }

    fn name(&self) -> &'static str {
        "MatmulBackward"
    }
}

/// Gradient function for batched 3-D matmul: z = a @ b per batch
pub(crate) struct BmmBackward {
    pub(crate) a: Tensor,
    pub(crate) b: Tensor,
}

impl GradFn for BmmBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let (batch, m, k) = (self.a.shape()[0], self.a.shape()[1], self.a.shape()[2]);
        let n = self.b.shape()[2];

        let b_t = transpose_last_raw(self.b.data(), batch, k, n);
        let grad_a = bmm_raw(grad_output.data(), &b_t, batch, m, n, k);

        let a_t = transpose_last_raw(self.a.data(), batch, m, k);
        let grad_b = bmm_raw(&a_t, grad_output.data(), batch, k, m, n);

        vec![
            Tensor::new(&grad_a, &[batch, m, k]),
            Tensor::new(&grad_b, &[batch, k, n]),
        ]
    }

    fn name(&self) -> &'static str {
        "BmmBackward"
    }
}

/// Gradient function for batched transpose of the last two axes.
pub(crate) struct TransposeLastBackward;

impl GradFn for TransposeLastBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // Transposing the gradient undoes the forward transpose.
        let shape = grad_output.shape();
        let (batch, m, n) = (shape[0], shape[1], shape[2]);
        let grad = transpose_last_raw(grad_output.data(), batch, m, n);
        vec![Tensor::new(&grad, &[batch, n, m])]
    }

    fn name(&self) -> &'static str {
        "TransposeLastBackward"
    }
}

/// Gradient function for bias broadcast-add over the last axis.
pub(crate) struct BroadcastAddBackward {
    pub(crate) bias_len: usize,
}

impl GradFn for BroadcastAddBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let mut grad_bias = vec![0.0f32; self.bias_len];
        for (i, &g) in grad_output.data().iter().enumerate() {
            grad_bias[i % self.bias_len] += g;
        }
        vec![
            grad_output.clone(),
            Tensor::new(&grad_bias, &[self.bias_len]),
        ]
    }

    fn name(&self) -> &'static str {
        "BroadcastAddBackward"
    }
}

// ============================================================================
// Shape operations
// ============================================================================

/// Gradient function for reshape (view).
pub(crate) struct ViewBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for ViewBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![Tensor::new(grad_output.data(), &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "ViewBackward"
    }
}

/// Scatter [nodes*heads, seq, head_dim] back to [nodes, seq, heads*head_dim].
pub(crate) fn merge_heads_raw(
    x: &[f32],
    nodes: usize,
    heads: usize,
    seq: usize,
    head_dim: usize,
) -> Vec<f32> {
    let embed = heads * head_dim;
    let mut out = vec![0.0f32; nodes * seq * embed];
    for n in 0..nodes {
        for h in 0..heads {
            let src_off = (n * heads + h) * seq * head_dim;
            for s in 0..seq {
                for d in 0..head_dim {
                    out[n * seq * embed + s * embed + h * head_dim + d] =
                        x[src_off + s * head_dim + d];
                }
            }
        }
    }
    out
}

/// Scatter [nodes, seq, heads*head_dim] to [nodes*heads, seq, head_dim].
pub(crate) fn split_heads_raw(
    x: &[f32],
    nodes: usize,
    heads: usize,
    seq: usize,
    head_dim: usize,
) -> Vec<f32> {
    let embed = heads * head_dim;
    let mut out = vec![0.0f32; nodes * seq * embed];
    for n in 0..nodes {
        for h in 0..heads {
            let dst_off = (n * heads + h) * seq * head_dim;
            for s in 0..seq {
                for d in 0..head_dim {
                    out[dst_off + s * head_dim + d] =
                        x[n * seq * embed + s * embed + h * head_dim + d];
                }
            }
        }
    }
    out
}

/// Gradient function for the head split permutation.
pub(crate) struct SplitHeadsBackward {
    pub(crate) nodes: usize,
    pub(crate) heads: usize,
    pub(crate) seq: usize,
    pub(crate) head_dim: usize,
}

impl GradFn for SplitHeadsBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let grad = merge_heads_raw(
            grad_output.data(),
            self.nodes,
            self.heads,
            self.seq,
            self.head_dim,
        );
        vec![Tensor::new(
            &grad,
            &[self.nodes, self.seq, self.heads * self.head_dim],
        )]
    }

    fn name(&self) -> &'static str {
        "SplitHeadsBackward"
    }
}

/// Gradient function for the head merge permutation.
pub(crate) struct MergeHeadsBackward {
    pub(crate) nodes: usize,
    pub(crate) heads: usize,
    pub(crate) seq: usize,
    pub(crate) head_dim: usize,
}

impl GradFn for MergeHeadsBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let grad = split_heads_raw(
            grad_output.data(),
            self.nodes,
            self.heads,
            self.seq,
            self.head_dim,
        );
        vec![Tensor::new(
            &grad,
            &[self.nodes * self.heads, self.seq, self.head_dim],
        )]
    }

    fn name(&self) -> &'static str {
        "MergeHeadsBackward"
    }
}

/// Gradient function for narrowing along axis 1 of a 3-D tensor.
pub(crate) struct Narrow1Backward {
    pub(crate) input_shape: Vec<usize>,
    pub(crate) start: usize,
}

impl GradFn for Narrow1Backward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let (n, s, d) = (
            self.input_shape[0],
            self.input_shape[1],
            self.input_shape[2],
        );
        let len = grad_output.shape()[1];
        let mut grad = vec![0.0f32; n * s * d];
        let g = grad_output.data();
        for i in 0..n {
            for j in 0..len {
                let src = (i * len + j) * d;
                let dst = (i * s + self.start + j) * d;
                grad[dst..dst + d].copy_from_slice(&g[src..src + d]);
            }
        }
        vec![Tensor::new(&grad, &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "Narrow1Backward"
    }
}

/// Gradient function for repeating a [n, 1, d] tensor along axis 1.
pub(crate) struct Repeat1Backward {
    pub(crate) times: usize,
}

impl GradFn for Repeat1Backward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let shape = grad_output.shape();
        let (n, d) = (shape[0], shape[2]);
        let mut grad = vec![0.0f32; n * d];
        let g = grad_output.data();
        for i in 0..n {
            for j in 0..self.times {
                let src = (i * self.times + j) * d;
                for f in 0..d {
                    grad[i * d + f] += g[src + f];
                }
            }
        }
        vec![Tensor::new(&grad, &[n, 1, d])]
    }

    fn name(&self) -> &'static str {
        "Repeat1Backward"
    }
}

/// Gradient function for expanding a [n, s, 1] tensor along the last axis.
pub(crate) struct ExpandLastBackward {
    pub(crate) times: usize,
}

impl GradFn for ExpandLastBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let shape = grad_output.shape();
        let (n, s) = (shape[0], shape[1]);
        let mut grad = vec![0.0f32; n * s];
        let g = grad_output.data();
        for r in 0..n * s {
            let mut acc = 0.0;
            for t in 0..self.times {
                acc += g[r * self.times + t];
            }
            grad[r] = acc;
        }
        vec![Tensor::new(&grad, &[n, s, 1])]
    }

    fn name(&self) -> &'static str {
        "ExpandLastBackward"
    }
}

/// Gradient function for concatenation along the last axis.
pub(crate) struct ConcatLastBackward {
    pub(crate) a_shape: Vec<usize>,
    pub(crate) b_shape: Vec<usize>,
}

impl GradFn for ConcatLastBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let a_last = *self.a_shape.last().expect("non-scalar");
        let b_last = *self.b_shape.last().expect("non-scalar");
        let rows: usize = self.a_shape[..self.a_shape.len() - 1].iter().product();
        let g = grad_output.data();

        let mut grad_a = vec![0.0f32; rows * a_last];
        let mut grad_b = vec![0.0f32; rows * b_last];
        let out_last = a_last + b_last;
        for r in 0..rows {
            let src = r * out_last;
            grad_a[r * a_last..(r + 1) * a_last].copy_from_slice(&g[src..src + a_last]);
            grad_b[r * b_last..(r + 1) * b_last]
                .copy_from_slice(&g[src + a_last..src + out_last]);
        }
        vec![
            Tensor::new(&grad_a, &self.a_shape),
            Tensor::new(&grad_b, &self.b_shape),
        ]
    }

    fn name(&self) -> &'static str {
        "ConcatLastBackward"
    }
}

/// Gradient function for summation over axis 1 of a 3-D tensor.
pub(crate) struct Sum1Backward {
    pub(crate) seq: usize,
}

impl GradFn for Sum1Backward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let shape = grad_output.shape();
        let (n, d) = (shape[0], shape[1]);
        let mut grad = vec![0.0f32; n * self.seq * d];
        let g = grad_output.data();
        for i in 0..n {
            for j in 0..self.seq {
                let dst = (i * self.seq + j) * d;
                grad[dst..dst + d].copy_from_slice(&g[i * d..(i + 1) * d]);
            }
        }
        vec![Tensor::new(&grad, &[n, self.seq, d])]
    }

    fn name(&self) -> &'static str {
        "Sum1Backward"
    }
}

// ============================================================================
// Softmax and normalization
// ============================================================================

/// Gradient function for softmax along the last axis.
///
/// For y = softmax(x): ∂L/∂x_i = y_i * (g_i - Σ_j g_j * y_j), per row.
pub(crate) struct SoftmaxLastBackward {
    pub(crate) output: Tensor,
}

impl GradFn for SoftmaxLastBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let shape = self.output.shape();
        let cols = *shape.last().expect("non-scalar");
        let rows = if cols == 0 { 0 } else { self.output.numel() / cols };

        let out = self.output.data();
        let g = grad_output.data();
        let mut grad = vec![0.0f32; out.len()];

        for r in 0..rows {
            let off = r * cols;
            let mut dot = 0.0f32;
            for j in 0..cols {
                dot += g[off + j] * out[off + j];
            }
            for j in 0..cols {
                grad[off + j] = out[off + j] * (g[off + j] - dot);
            }
        }

        vec![Tensor::new(&grad, shape)]
    }

    fn name(&self) -> &'static str {
        "SoftmaxLastBackward"
    }
}

/// Gradient function for layer normalization over the last axis.
///
/// With x̂ = (x - μ) / σ and y = γ * x̂ + β, per row of size N:
///
/// ```text
/// dβ  = Σ_rows dy
/// dγ  = Σ_rows dy * x̂
/// dx̂  = dy * γ
/// dx  = (1/σ) * (dx̂ - mean(dx̂) - x̂ * mean(dx̂ * x̂))
/// ```
pub(crate) struct LayerNormBackward {
    /// Normalized input x̂ (saved from the forward pass)
    pub(crate) xhat: Tensor,
    /// Per-row 1/σ
    pub(crate) inv_std: Vec<f32>,
    /// Scale parameter γ
    pub(crate) weight: Tensor,
}

impl GradFn for LayerNormBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let norm_size = self.weight.numel();
        let rows = if norm_size == 0 {
            0
        } else {
            self.xhat.numel() / norm_size
        };

        let xhat = self.xhat.data();
        let gamma = self.weight.data();
        let g = grad_output.data();

        let mut grad_x = vec![0.0f32; xhat.len()];
        let mut grad_gamma = vec![0.0f32; norm_size];
        let mut grad_beta = vec![0.0f32; norm_size];

        for r in 0..rows {
            let off = r * norm_size;
            let inv_std = self.inv_std[r];

            let mut sum_dxhat = 0.0f32;
            let mut sum_dxhat_xhat = 0.0f32;
            for j in 0..norm_size {
                let dy = g[off + j];
                let dxhat = dy * gamma[j];
                sum_dxhat += dxhat;
                sum_dxhat_xhat += dxhat * xhat[off + j];
                grad_gamma[j] += dy * xhat[off + j];
                grad_beta[j] += dy;
            }

            let inv_n = 1.0 / norm_size as f32;
            for j in 0..norm_size {
                let dxhat = g[off + j] * gamma[j];
                grad_x[off + j] = inv_std
                    * (dxhat - sum_dxhat * inv_n - xhat[off + j] * sum_dxhat_xhat * inv_n);
            }
        }

        vec![
            Tensor::new(&grad_x, self.xhat.shape()),
            Tensor::new(&grad_gamma, &[norm_size]),
            Tensor::new(&grad_beta, &[norm_size]),
        ]
    }

    fn name(&self) -> &'static str {
        "LayerNormBackward"
    }
}

// ============================================================================
// Segment pooling (node -> graph aggregation)
// ============================================================================

/// Gradient function for per-graph mean pooling of node embeddings.
pub(crate) struct SegmentMeanBackward {
    pub(crate) assignment: Vec<usize>,
    pub(crate) counts: Vec<f32>,
    pub(crate) features: usize,
}

impl GradFn for SegmentMeanBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let d = self.features;
        let n = self.assignment.len();
        let g = grad_output.data();
        let mut grad = vec![0.0f32; n * d];
        for (i, &graph) in self.assignment.iter().enumerate() {
            let scale = 1.0 / self.counts[graph];
            for f in 0..d {
                grad[i * d + f] = g[graph * d + f] * scale;
            }
        }
        vec![Tensor::new(&grad, &[n, d])]
    }

    fn name(&self) -> &'static str {
        "SegmentMeanBackward"
    }
}

/// Gradient function for per-graph max pooling of node embeddings.
///
/// Gradient is routed to the node that produced the maximum in each
/// (graph, feature) slot.
pub(crate) struct SegmentMaxBackward {
    /// For each (graph, feature) slot, the node index of the maximum
    pub(crate) argmax: Vec<usize>,
    pub(crate) num_nodes: usize,
    pub(crate) features: usize,
}

impl GradFn for SegmentMaxBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let d = self.features;
        let g = grad_output.data();
        let mut grad = vec![0.0f32; self.num_nodes * d];
        for (slot, &node) in self.argmax.iter().enumerate() {
            let f = slot % d;
            grad[node * d + f] += g[slot];
        }
        vec![Tensor::new(&grad, &[self.num_nodes, d])]
    }

    fn name(&self) -> &'static str {
        "SegmentMaxBackward"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matmul_raw_identity() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let eye = vec![1.0, 0.0, 0.0, 1.0];
        let out = matmul_raw(&a, &eye, 2, 2, 2);
        assert_eq!(out, a);
    }

    #[test]
    fn test_matmul_raw_known() {
        // [1 2; 3 4] @ [5 6; 7 8] = [19 22; 43 50]
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let b = vec![5.0, 6.0, 7.0, 8.0];
        let out = matmul_raw(&a, &b, 2, 2, 2);
        assert_eq!(out, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_transpose_last_raw() {
        // [[1 2 3], [4 5 6]] -> [[1 4], [2 5], [3 6]]
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let t = transpose_last_raw(&x, 1, 2, 3);
        assert_eq!(t, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_bmm_raw_two_batches() {
        // Batch 0: identity; batch 1: doubling matrix.
        let a = vec![1.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 2.0];
        let b = vec![1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0];
        let out = bmm_raw(&a, &b, 2, 2, 2, 2);
        assert_eq!(out[..4], [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(out[4..], [2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_split_merge_heads_roundtrip() {
        // 1 node, 2 heads, 2 hops, head_dim 2
        let x: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let split = split_heads_raw(&x, 1, 2, 2, 2);
        // head 0 rows: [0,1] (hop 0), [4,5] (hop 1); head 1: [2,3], [6,7]
        assert_eq!(split, vec![0.0, 1.0, 4.0, 5.0, 2.0, 3.0, 6.0, 7.0]);
        let merged = merge_heads_raw(&split, 1, 2, 2, 2);
        assert_eq!(merged, x);
    }

    #[test]
    fn test_softmax_backward_uniform_grad_is_zero() {
        // With uniform upstream gradient the softmax Jacobian nullifies it.
        let output = Tensor::new(&[0.25, 0.25, 0.25, 0.25], &[1, 4]);
        let grad_fn = SoftmaxLastBackward { output };
        let g = grad_fn.backward(&Tensor::new(&[1.0, 1.0, 1.0, 1.0], &[1, 4]));
        for &v in g[0].data() {
            assert!(v.abs() < 1e-6);
        }
    }

    #[test]
    fn test_segment_max_backward_routes_to_argmax() {
        let grad_fn = SegmentMaxBackward {
            argmax: vec![1, 0],
            num_nodes: 3,
            features: 2,
        };
        let g = grad_fn.backward(&Tensor::new(&[5.0, 7.0], &[1, 2]));
        assert_eq!(g[0].data(), &[0.0, 7.0, 5.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_broadcast_add_backward_sums_rows() {
        let grad_fn = BroadcastAddBackward { bias_len: 2 };
        let g = grad_fn.backward(&Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]));
        assert_eq!(g[1].data(), &[4.0, 6.0]);
    }
}
