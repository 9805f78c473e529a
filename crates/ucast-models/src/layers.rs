//! Layer kernels with explicit forward/backward passes.
//!
//! Every parameter carries its Adam moment estimates alongside the value,
//! so an optimizer step is a method call on the layer. Forward passes are
//! `&self` and cache-free unless the caller asks for a training cache —
//! that keeps inference side-effect-free and safe to fan out across
//! threads.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Adam hyperparameters, fixed across all variants.
const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPS: f32 = 1e-8;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Outer product a ⊗ b.
fn outer(a: &Array1<f32>, b: &Array1<f32>) -> Array2<f32> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j])
}

/// A weight matrix with Adam moments and a transient gradient buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamMat {
    pub value: Array2<f32>,
    m: Array2<f32>,
    v: Array2<f32>,
    #[serde(skip)]
    pub grad: Array2<f32>,
}

impl ParamMat {
    pub fn new(value: Array2<f32>) -> Self {
        let m = Array2::zeros(value.raw_dim());
        let v = Array2::zeros(value.raw_dim());
        let grad = Array2::zeros(value.raw_dim());
        Self { value, m, v, grad }
    }

    /// Glorot-uniform initialization from the model's seeded RNG.
    pub fn glorot(rows: usize, cols: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (rows + cols) as f32).sqrt();
        let value = Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-limit..limit));
        Self::new(value)
    }

    pub fn zero_grad(&mut self) {
        self.grad = Array2::zeros(self.value.raw_dim());
    }

    pub fn adam_step(&mut self, lr: f32, step: usize) {
        let t = step as i32;
        let correction1 = 1.0 - BETA1.powi(t);
        let correction2 = 1.0 - BETA2.powi(t);
        adam_update(
            self.value.iter_mut(),
            self.m.iter_mut(),
            self.v.iter_mut(),
            self.grad.iter(),
            lr,
            correction1,
            correction2,
        );
    }
}

/// A bias vector with Adam moments and a transient gradient buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamVec {
    pub value: Array1<f32>,
    m: Array1<f32>,
    v: Array1<f32>,
    #[serde(skip)]
    pub grad: Array1<f32>,
}

impl ParamVec {
    pub fn zeros(len: usize) -> Self {
        Self {
            value: Array1::zeros(len),
            m: Array1::zeros(len),
            v: Array1::zeros(len),
            grad: Array1::zeros(len),
        }
    }

    pub fn zero_grad(&mut self) {
        self.grad = Array1::zeros(self.value.raw_dim());
    }

    pub fn adam_step(&mut self, lr: f32, step: usize) {
        let t = step as i32;
        let correction1 = 1.0 - BETA1.powi(t);
        let correction2 = 1.0 - BETA2.powi(t);
        adam_update(
            self.value.iter_mut(),
            self.m.iter_mut(),
            self.v.iter_mut(),
            self.grad.iter(),
            lr,
            correction1,
            correction2,
        );
    }
}

/// Shared elementwise Adam update.
fn adam_update<'a>(
    value: impl Iterator<Item = &'a mut f32>,
    m: impl Iterator<Item = &'a mut f32>,
    v: impl Iterator<Item = &'a mut f32>,
    grad: impl Iterator<Item = &'a f32>,
    lr: f32,
    correction1: f32,
    correction2: f32,
) {
    for (((value, m), v), &g) in value.zip(m).zip(v).zip(grad) {
        *m = BETA1 * *m + (1.0 - BETA1) * g;
        *v = BETA2 * *v + (1.0 - BETA2) * g * g;
        let m_hat = *m / correction1;
        let v_hat = *v / correction2;
        *value -= lr * m_hat / (v_hat.sqrt() + EPS);
    }
}

// ============================================================================
// DENSE
// ============================================================================

/// Fully connected layer, optionally ReLU-activated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    pub w: ParamMat,
    pub b: ParamVec,
    pub relu: bool,
}

impl Dense {
    pub fn new(input_dim: usize, output_dim: usize, relu: bool, rng: &mut StdRng) -> Self {
        Self {
            w: ParamMat::glorot(input_dim, output_dim, rng),
            b: ParamVec::zeros(output_dim),
            relu,
        }
    }

    /// Single-sample forward: (in,) -> (out,).
    pub fn forward(&self, x: &Array1<f32>) -> Array1<f32> {
        let mut y = x.dot(&self.w.value) + &self.b.value;
        if self.relu {
            y.mapv_inplace(|v| v.max(0.0));
        }
        y
    }

    /// Single-sample backward. `y` is the forward output (post-activation).
    /// Accumulates parameter gradients, returns the input gradient.
    pub fn backward(&mut self, x: &Array1<f32>, y: &Array1<f32>, grad: &Array1<f32>) -> Array1<f32> {
        let g = if self.relu {
            Array1::from_shape_fn(grad.len(), |i| if y[i] > 0.0 { grad[i] } else { 0.0 })
        } else {
            grad.clone()
        };
        self.w.grad += &outer(x, &g);
        self.b.grad += &g;
        self.w.value.dot(&g)
    }

    /// Row-batched forward: (n, in) -> (n, out). Used by the graph
    /// convolution where rows are zones.
    pub fn forward_batch(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut y = x.dot(&self.w.value) + &self.b.value;
        if self.relu {
            y.mapv_inplace(|v| v.max(0.0));
        }
        y
    }

    /// Row-batched backward counterpart of `forward_batch`.
    pub fn backward_batch(
        &mut self,
        x: &Array2<f32>,
        y: &Array2<f32>,
        grad: &Array2<f32>,
    ) -> Array2<f32> {
        let g = if self.relu {
            Array2::from_shape_fn(grad.raw_dim(), |(i, j)| {
                if y[[i, j]] > 0.0 {
                    grad[[i, j]]
                } else {
                    0.0
                }
            })
        } else {
            grad.clone()
        };
        self.w.grad += &x.t().dot(&g);
        self.b.grad += &g.sum_axis(Axis(0));
        g.dot(&self.w.value.t())
    }

    pub fn zero_grad(&mut self) {
        self.w.zero_grad();
        self.b.zero_grad();
    }

    pub fn adam_step(&mut self, lr: f32, step: usize) {
        self.w.adam_step(lr, step);
        self.b.adam_step(lr, step);
    }
}

// ============================================================================
// DROPOUT
// ============================================================================

/// Inverted dropout. Only ever applied during training; inference paths
/// never construct a mask.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Dropout {
    pub rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        Self { rate }
    }

    pub fn mask1(&self, len: usize, rng: &mut StdRng) -> Array1<f32> {
        if self.rate <= 0.0 {
            return Array1::ones(len);
        }
        let keep = 1.0 / (1.0 - self.rate);
        Array1::from_shape_fn(len, |_| {
            if rng.gen::<f32>() < self.rate {
                0.0
            } else {
                keep
            }
        })
    }

    pub fn mask2(&self, shape: (usize, usize), rng: &mut StdRng) -> Array2<f32> {
        if self.rate <= 0.0 {
            return Array2::ones(shape);
        }
        let keep = 1.0 / (1.0 - self.rate);
        Array2::from_shape_fn(shape, |_| {
            if rng.gen::<f32>() < self.rate {
                0.0
            } else {
                keep
            }
        })
    }
}

// ============================================================================
// GRU
// ============================================================================

/// Single GRU layer run over a (timesteps, input_dim) sequence.
///
/// Gates follow the standard formulation:
/// z = σ(xW_z + hU_z + b_z), r = σ(xW_r + hU_r + b_r),
/// n = tanh(xW_n + r ∘ (hU_n) + b_n), h' = (1−z) ∘ n + z ∘ h.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gru {
    pub input_dim: usize,
    pub hidden_dim: usize,
    w_z: ParamMat,
    u_z: ParamMat,
    b_z: ParamVec,
    w_r: ParamMat,
    u_r: ParamMat,
    b_r: ParamVec,
    w_n: ParamMat,
    u_n: ParamMat,
    b_n: ParamVec,
}

/// Per-step activations recorded by a training forward pass.
#[derive(Debug, Clone)]
pub struct GruCache {
    /// Hidden states, (L+1, hidden); row 0 is the zero initial state.
    pub h: Array2<f32>,
    z: Array2<f32>,
    r: Array2<f32>,
    n: Array2<f32>,
    /// h_prev · U_n, needed to route gradients through the reset gate.
    hn: Array2<f32>,
}

impl Gru {
    pub fn new(input_dim: usize, hidden_dim: usize, rng: &mut StdRng) -> Self {
        Self {
            input_dim,
            hidden_dim,
            w_z: ParamMat::glorot(input_dim, hidden_dim, rng),
            u_z: ParamMat::glorot(hidden_dim, hidden_dim, rng),
            b_z: ParamVec::zeros(hidden_dim),
            w_r: ParamMat::glorot(input_dim, hidden_dim, rng),
            u_r: ParamMat::glorot(hidden_dim, hidden_dim, rng),
            b_r: ParamVec::zeros(hidden_dim),
            w_n: ParamMat::glorot(input_dim, hidden_dim, rng),
            u_n: ParamMat::glorot(hidden_dim, hidden_dim, rng),
            b_n: ParamVec::zeros(hidden_dim),
        }
    }

    /// Inference forward: (L, in) -> (L, hidden), zero initial state.
    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        self.run_forward(x).0
    }

    /// Training forward returning the activation cache.
    pub fn forward_cached(&self, x: &Array2<f32>) -> (Array2<f32>, GruCache) {
        self.run_forward(x)
    }

    fn run_forward(&self, x: &Array2<f32>) -> (Array2<f32>, GruCache) {
        let steps = x.nrows();
        let h_dim = self.hidden_dim;

        let mut out = Array2::zeros((steps, h_dim));
        let mut cache = GruCache {
            h: Array2::zeros((steps + 1, h_dim)),
            z: Array2::zeros((steps, h_dim)),
            r: Array2::zeros((steps, h_dim)),
            n: Array2::zeros((steps, h_dim)),
            hn: Array2::zeros((steps, h_dim)),
        };

        let mut h_prev: Array1<f32> = Array1::zeros(h_dim);
        for t in 0..steps {
            let x_t = x.row(t).to_owned();
            let z = (x_t.dot(&self.w_z.value) + h_prev.dot(&self.u_z.value) + &self.b_z.value)
                .mapv(sigmoid);
            let r = (x_t.dot(&self.w_r.value) + h_prev.dot(&self.u_r.value) + &self.b_r.value)
                .mapv(sigmoid);
            let hn = h_prev.dot(&self.u_n.value);
            let n = (x_t.dot(&self.w_n.value) + &r * &hn + &self.b_n.value).mapv(f32::tanh);
            let h = Array1::from_shape_fn(h_dim, |i| (1.0 - z[i]) * n[i] + z[i] * h_prev[i]);

            cache.z.row_mut(t).assign(&z);
            cache.r.row_mut(t).assign(&r);
            cache.n.row_mut(t).assign(&n);
            cache.hn.row_mut(t).assign(&hn);
            cache.h.row_mut(t + 1).assign(&h);
            out.row_mut(t).assign(&h);
            h_prev = h;
        }

        (out, cache)
    }

    /// Backward through time. `grad_out` is (L, hidden) — callers that only
    /// use the final state pass zeros everywhere but the last row.
    /// Accumulates parameter gradients, returns the (L, in) input gradient.
    pub fn backward(
        &mut self,
        x: &Array2<f32>,
        cache: &GruCache,
        grad_out: &Array2<f32>,
    ) -> Array2<f32> {
        let steps = x.nrows();
        let h_dim = self.hidden_dim;

        let mut grad_x = Array2::zeros((steps, self.input_dim));
        let mut dh_next: Array1<f32> = Array1::zeros(h_dim);

        for t in (0..steps).rev() {
            let x_t = x.row(t).to_owned();
            let h_prev = cache.h.row(t).to_owned();
            let z = cache.z.row(t);
            let r = cache.r.row(t);
            let n = cache.n.row(t);
            let hn = cache.hn.row(t);

            let dh = &grad_out.row(t).to_owned() + &dh_next;

            let dn = Array1::from_shape_fn(h_dim, |i| dh[i] * (1.0 - z[i]));
            let dz = Array1::from_shape_fn(h_dim, |i| dh[i] * (h_prev[i] - n[i]));
            let mut dh_prev = Array1::from_shape_fn(h_dim, |i| dh[i] * z[i]);

            // New-state gate: n = tanh(xW_n + r ∘ hn + b_n)
            let dn_pre = Array1::from_shape_fn(h_dim, |i| dn[i] * (1.0 - n[i] * n[i]));
            self.w_n.grad += &outer(&x_t, &dn_pre);
            self.b_n.grad += &dn_pre;
            let dr = Array1::from_shape_fn(h_dim, |i| dn_pre[i] * hn[i]);
            let dhn = Array1::from_shape_fn(h_dim, |i| dn_pre[i] * r[i]);
            self.u_n.grad += &outer(&h_prev, &dhn);
            dh_prev += &self.u_n.value.dot(&dhn);
            let mut dx = self.w_n.value.dot(&dn_pre);

            // Update gate: z = σ(xW_z + h_prev U_z + b_z)
            let dz_pre = Array1::from_shape_fn(h_dim, |i| dz[i] * z[i] * (1.0 - z[i]));
            self.w_z.grad += &outer(&x_t, &dz_pre);
            self.u_z.grad += &outer(&h_prev, &dz_pre);
            self.b_z.grad += &dz_pre;
            dx += &self.w_z.value.dot(&dz_pre);
            dh_prev += &self.u_z.value.dot(&dz_pre);

            // Reset gate: r = σ(xW_r + h_prev U_r + b_r)
            let dr_pre = Array1::from_shape_fn(h_dim, |i| dr[i] * r[i] * (1.0 - r[i]));
            self.w_r.grad += &outer(&x_t, &dr_pre);
            self.u_r.grad += &outer(&h_prev, &dr_pre);
            self.b_r.grad += &dr_pre;
            dx += &self.w_r.value.dot(&dr_pre);
            dh_prev += &self.u_r.value.dot(&dr_pre);

            grad_x.row_mut(t).assign(&dx);
            dh_next = dh_prev;
        }

        grad_x
    }

    pub fn zero_grad(&mut self) {
        for p in [
            &mut self.w_z,
            &mut self.u_z,
            &mut self.w_r,
            &mut self.u_r,
            &mut self.w_n,
            &mut self.u_n,
        ] {
            p.zero_grad();
        }
        for p in [&mut self.b_z, &mut self.b_r, &mut self.b_n] {
            p.zero_grad();
        }
    }

    pub fn adam_step(&mut self, lr: f32, step: usize) {
        for p in [
            &mut self.w_z,
            &mut self.u_z,
            &mut self.w_r,
            &mut self.u_r,
            &mut self.w_n,
            &mut self.u_n,
        ] {
            p.adam_step(lr, step);
        }
        for p in [&mut self.b_z, &mut self.b_r, &mut self.b_n] {
            p.adam_step(lr, step);
        }
    }
}

// ============================================================================
// 1-D CONVOLUTION + POOLING
// ============================================================================

/// Valid 1-D convolution over the time axis, ReLU-activated.
///
/// Weights are stored im2col-style as (kernel * in_channels, out_channels),
/// so forward is one matmul per sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv1d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: usize,
    w: ParamMat,
    b: ParamVec,
}

/// Training cache: the im2col matrix plus the post-activation output.
#[derive(Debug, Clone)]
pub struct Conv1dCache {
    cols: Array2<f32>,
    pub y: Array2<f32>,
}

impl Conv1d {
    pub fn new(in_channels: usize, out_channels: usize, kernel: usize, rng: &mut StdRng) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel,
            w: ParamMat::glorot(kernel * in_channels, out_channels, rng),
            b: ParamVec::zeros(out_channels),
        }
    }

    /// Output length for an input of `steps` timesteps.
    pub fn output_len(&self, steps: usize) -> usize {
        steps + 1 - self.kernel
    }

    fn im2col(&self, x: &Array2<f32>) -> Array2<f32> {
        let out_len = self.output_len(x.nrows());
        Array2::from_shape_fn((out_len, self.kernel * self.in_channels), |(t, j)| {
            let offset = j / self.in_channels;
            let channel = j % self.in_channels;
            x[[t + offset, channel]]
        })
    }

    /// Inference forward: (L, in) -> (L - k + 1, out).
    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        self.run_forward(x).0
    }

    pub fn forward_cached(&self, x: &Array2<f32>) -> (Array2<f32>, Conv1dCache) {
        self.run_forward(x)
    }

    fn run_forward(&self, x: &Array2<f32>) -> (Array2<f32>, Conv1dCache) {
        let cols = self.im2col(x);
        let mut y = cols.dot(&self.w.value) + &self.b.value;
        y.mapv_inplace(|v| v.max(0.0));
        let cache = Conv1dCache { cols, y: y.clone() };
        (y, cache)
    }

    /// Accumulates parameter gradients, returns the (L, in) input gradient.
    pub fn backward(
        &mut self,
        input_len: usize,
        cache: &Conv1dCache,
        grad_out: &Array2<f32>,
    ) -> Array2<f32> {
        let g = Array2::from_shape_fn(grad_out.raw_dim(), |(i, j)| {
            if cache.y[[i, j]] > 0.0 {
                grad_out[[i, j]]
            } else {
                0.0
            }
        });
        self.w.grad += &cache.cols.t().dot(&g);
        self.b.grad += &g.sum_axis(Axis(0));

        let dcols = g.dot(&self.w.value.t());
        let mut dx = Array2::zeros((input_len, self.in_channels));
        for t in 0..dcols.nrows() {
            for j in 0..dcols.ncols() {
                let offset = j / self.in_channels;
                let channel = j % self.in_channels;
                dx[[t + offset, channel]] += dcols[[t, j]];
            }
        }
        dx
    }

    pub fn zero_grad(&mut self) {
        self.w.zero_grad();
        self.b.zero_grad();
    }

    pub fn adam_step(&mut self, lr: f32, step: usize) {
        self.w.adam_step(lr, step);
        self.b.adam_step(lr, step);
    }
}

/// Non-overlapping max pooling over the time axis (floor division).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MaxPool1d {
    pub pool: usize,
}

impl MaxPool1d {
    pub fn new(pool: usize) -> Self {
        Self { pool }
    }

    pub fn output_len(&self, steps: usize) -> usize {
        steps / self.pool
    }

    /// Forward with argmax positions for the backward scatter.
    pub fn forward(&self, x: &Array2<f32>) -> (Array2<f32>, Array2<usize>) {
        let out_len = self.output_len(x.nrows());
        let channels = x.ncols();
        let mut y = Array2::zeros((out_len, channels));
        let mut argmax = Array2::zeros((out_len, channels));
        for t in 0..out_len {
            for c in 0..channels {
                let mut best = t * self.pool;
                for step in t * self.pool..(t + 1) * self.pool {
                    if x[[step, c]] > x[[best, c]] {
                        best = step;
                    }
                }
                y[[t, c]] = x[[best, c]];
                argmax[[t, c]] = best;
            }
        }
        (y, argmax)
    }

    pub fn backward(
        &self,
        input_len: usize,
        argmax: &Array2<usize>,
        grad_out: &Array2<f32>,
    ) -> Array2<f32> {
        let mut dx = Array2::zeros((input_len, grad_out.ncols()));
        for t in 0..grad_out.nrows() {
            for c in 0..grad_out.ncols() {
                dx[[argmax[[t, c]], c]] += grad_out[[t, c]];
            }
        }
        dx
    }
}
