use crate::ops::conv::Conv2dGeometry;

/// Unfolds one `[C, H, W]` image into a `[C*kh*kw, oh*ow]` column matrix.
/// Padded positions read as zero.
pub(crate) fn im2col(image: &[f32], g: &Conv2dGeometry) -> Vec<f32> {
    let cols_per_row = g.out_h * g.out_w;
    let mut cols = vec![0.0f32; g.patch_len() * cols_per_row];
    for c in 0..g.in_channels {
        let plane = &image[c * g.in_h * g.in_w..(c + 1) * g.in_h * g.in_w];
        for ki in 0..g.kernel_h {
            for kj in 0..g.kernel_w {
                let row = (c * g.kernel_h + ki) * g.kernel_w + kj;
                let dst = &mut cols[row * cols_per_row..(row + 1) * cols_per_row];
                for oy in 0..g.out_h {
                    let Some(iy) = g.source_row(oy, ki) else {
                        continue;
                    };
                    for ox in 0..g.out_w {
                        if let Some(ix) = g.source_col(ox, kj) {
                            dst[oy * g.out_w + ox] = plane[iy * g.in_w + ix];
                        }
                    }
                }
            }
        }
    }
    cols
}

/// Folds a column matrix back onto a `[C, H, W]` image, summing overlaps into `image`.
pub(crate) fn col2im(cols: &[f32], g: &Conv2dGeometry, image: &mut [f32]) {
    let cols_per_row = g.out_h * g.out_w;
    for c in 0..g.in_channels {
        let plane = &mut image[c * g.in_h * g.in_w..(c + 1) * g.in_h * g.in_w];
        for ki in 0..g.kernel_h {
            for kj in 0..g.kernel_w {
                let row = (c * g.kernel_h + ki) * g.kernel_w + kj;
                let src = &cols[row * cols_per_row..(row + 1) * cols_per_row];
                for oy in 0..g.out_h {
                    let Some(iy) = g.source_row(oy, ki) else {
                        continue;
                    };
                    for ox in 0..g.out_w {
                        if let Some(ix) = g.source_col(ox, kj) {
                            plane[iy * g.in_w + ix] += src[oy * g.out_w + ox];
                        }
                    }
                }
            }
        }
    }
}
