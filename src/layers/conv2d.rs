//! 2D convolution over `[batch, channels, height, width]` tensors.
//!
//! Forward and backward both go through an im2col buffer so the inner work is
//! a plain matrix product (see `math::ops`).

use rand::Rng;

use crate::error::{Error, Result};
use crate::layers::layer::{Layer, Mode, Param};
use crate::math::ops::{matmul_acc, matmul_a_bt_acc, matmul_at_b_acc};
use crate::math::tensor::Tensor;

/// Square-kernel convolution with learnable filters.
///
/// Weights are stored as `[out_channels, in_channels, kernel, kernel]`, biases
/// as `[out_channels]`, matching the usual state-dict layout.
#[derive(Debug)]
pub struct Conv2d {
    name: String,
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub weight: Param,
    pub bias: Param,
    input: Option<Tensor>,
}

impl Conv2d {
    /// Weights and biases are drawn from U(-1/√fan_in, 1/√fan_in) with
    /// `fan_in = in_channels · kernel²`.
    pub fn new<R: Rng + ?Sized>(
        name: &str,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        rng: &mut R,
    ) -> Conv2d {
        let fan_in = (in_channels * kernel_size * kernel_size) as f32;
        let bound = 1.0 / fan_in.sqrt();
        let weight = Tensor::uniform(&[out_channels, in_channels, kernel_size, kernel_size], bound, rng);
        let bias = Tensor::uniform(&[out_channels], bound, rng);

        Conv2d {
            name: name.to_owned(),
            in_channels,
            out_channels,
            kernel_size,
            stride: stride.max(1),
            padding,
            weight: Param::new(weight),
            bias: Param::new(bias),
            input: None,
        }
    }

    fn output_hw(&self, h: usize, w: usize) -> Result<(usize, usize)> {
        let (ph, pw) = (h + 2 * self.padding, w + 2 * self.padding);
        if ph < self.kernel_size || pw < self.kernel_size {
            return Err(Error::Shape(format!(
                "{}: {}x{} input is smaller than the {}x{} kernel",
                self.name, h, w, self.kernel_size, self.kernel_size
            )));
        }
        Ok((
            (ph - self.kernel_size) / self.stride + 1,
            (pw - self.kernel_size) / self.stride + 1,
        ))
    }

    fn check_input(&self, input: &Tensor) -> Result<(usize, usize, usize)> {
        if input.shape.len() != 4 || input.shape[1] != self.in_channels {
            return Err(Error::Shape(format!(
                "{}: expected [B, {}, H, W], got {:?}",
                self.name, self.in_channels, input.shape
            )));
        }
        Ok((input.shape[0], input.shape[2], input.shape[3]))
    }

    /// Unfolds one sample `[C, H, W]` into `[C·k·k, oh·ow]`.
    fn im2col(&self, sample: &[f32], h: usize, w: usize, oh: usize, ow: usize, cols: &mut [f32]) {
        let k = self.kernel_size;
        let spatial = oh * ow;
        for ic in 0..self.in_channels {
            let plane = &sample[ic * h * w..(ic + 1) * h * w];
            for ky in 0..k {
                for kx in 0..k {
                    let row = (ic * k + ky) * k + kx;
                    let dst = &mut cols[row * spatial..(row + 1) * spatial];
                    for oy in 0..oh {
                        let iy = (oy * self.stride + ky) as isize - self.padding as isize;
                        for ox in 0..ow {
                            let ix = (ox * self.stride + kx) as isize - self.padding as isize;
                            dst[oy * ow + ox] = if iy >= 0 && ix >= 0 && (iy as usize) < h && (ix as usize) < w {
                                plane[iy as usize * w + ix as usize]
                            } else {
                                0.0
                            };
                        }
                    }
                }
            }
        }
    }

    /// Folds `[C·k·k, oh·ow]` back into one sample `[C, H, W]`, summing overlaps.
    fn col2im(&self, cols: &[f32], h: usize, w: usize, oh: usize, ow: usize, sample: &mut [f32]) {
        let k = self.kernel_size;
        let spatial = oh * ow;
        for ic in 0..self.in_channels {
            let plane = &mut sample[ic * h * w..(ic + 1) * h * w];
            for ky in 0..k {
                for kx in 0..k {
                    let row = (ic * k + ky) * k + kx;
                    let src = &cols[row * spatial..(row + 1) * spatial];
                    for oy in 0..oh {
                        let iy = (oy * self.stride + ky) as isize - self.padding as isize;
                        if iy < 0 || iy as usize >= h {
                            continue;
                        }
                        for ox in 0..ow {
                            let ix = (ox * self.stride + kx) as isize - self.padding as isize;
                            if ix >= 0 && (ix as usize) < w {
                                plane[iy as usize * w + ix as usize] += src[oy * ow + ox];
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Layer for Conv2d {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self, input: &Tensor, _mode: Mode) -> Result<Tensor> {
        let (batch, h, w) = self.check_input(input)?;
        let (oh, ow) = self.output_hw(h, w)?;
        let ckk = self.in_channels * self.kernel_size * self.kernel_size;
        let spatial = oh * ow;

        let mut output = Tensor::zeros(&[batch, self.out_channels, oh, ow]);
        let mut cols = vec![0.0f32; ckk * spatial];
        let out_len = self.out_channels * spatial;

        for b in 0..batch {
            self.im2col(input.sample(b), h, w, oh, ow, &mut cols);
            let out = &mut output.data[b * out_len..(b + 1) * out_len];
            for (oc, plane) in out.chunks_mut(spatial).enumerate() {
                plane.fill(self.bias.value.data[oc]);
            }
            matmul_acc(&self.weight.value.data, &cols, out, self.out_channels, ckk, spatial);
        }

        self.input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let input = self.input.take().ok_or_else(|| {
            Error::Shape(format!("{}: backward called before forward", self.name))
        })?;
        let (batch, h, w) = self.check_input(&input)?;
        let (oh, ow) = self.output_hw(h, w)?;
        if grad_output.shape != [batch, self.out_channels, oh, ow] {
            return Err(Error::Shape(format!(
                "{}: gradient shape {:?} does not match output [{}, {}, {}, {}]",
                self.name, grad_output.shape, batch, self.out_channels, oh, ow
            )));
        }

        let ckk = self.in_channels * self.kernel_size * self.kernel_size;
        let spatial = oh * ow;
        let mut grad_input = Tensor::zeros(&input.shape);
        let in_len = input.sample_len();
        let mut cols = vec![0.0f32; ckk * spatial];
        let mut grad_cols = vec![0.0f32; ckk * spatial];

        for b in 0..batch {
            let g = grad_output.sample(b);

            for (oc, plane) in g.chunks(spatial).enumerate() {
                self.bias.grad.data[oc] += plane.iter().sum::<f32>();
            }

            // dW += dOut · colsᵀ
            self.im2col(input.sample(b), h, w, oh, ow, &mut cols);
            matmul_a_bt_acc(g, &cols, &mut self.weight.grad.data, self.out_channels, spatial, ckk);

            // dCols = Wᵀ · dOut
            grad_cols.fill(0.0);
            matmul_at_b_acc(&self.weight.value.data, g, &mut grad_cols, ckk, self.out_channels, spatial);
            self.col2im(&grad_cols, h, w, oh, ow, &mut grad_input.data[b * in_len..(b + 1) * in_len]);
        }

        Ok(grad_input)
    }

    fn params_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        vec![("weight", &mut self.weight), ("bias", &mut self.bias)]
    }

    fn params(&self) -> Vec<(&'static str, &Param)> {
        vec![("weight", &self.weight), ("bias", &self.bias)]
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        if input.len() != 3 || input[0] != self.in_channels {
            return Err(Error::Shape(format!(
                "{}: expected [{}, H, W], got {:?}",
                self.name, self.in_channels, input
            )));
        }
        let (oh, ow) = self.output_hw(input[1], input[2])?;
        Ok(vec![self.out_channels, oh, ow])
    }
}
