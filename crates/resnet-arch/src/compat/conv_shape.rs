//! # Convolution Shape Utilities
//!
//! Utilities for computing the output size of convolution and pooling windows.

/// Predict the output size of a 1D window operation (convolution or pooling).
///
/// ```text
/// out_size = floor( (in_size + 2*padding - kernel_size) / stride ) + 1
/// ```
///
/// # Reference
///
/// - [conv_arithmetic diagram](https://github.com/vdumoulin/conv_arithmetic/blob/master/README.md)
///   visual explanations of these convolution parameters.
/// - [pytorch conv1d](https://docs.pytorch.org/docs/stable/generated/torch.nn.Conv1d.html)
///
/// # Arguments
///
/// - `input_size`: The input dimension size.
/// - `kernel_size`: The kernel size.
/// - `stride`: The stride of the window.
/// - `padding`: The padding, added evenly to both sides of the input.
///
/// # Returns
///
/// An `Option<usize>` representing the output size; or `None` when the
/// output would be <= 0, any of `input_size`, `kernel_size`, `stride` is 0,
/// or the padded size overflows `usize`.
pub fn maybe_conv1d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> Option<usize> {
    if input_size == 0 || kernel_size == 0 || stride == 0 {
        return None;
    }

    let effective_size = padding
        .checked_mul(2)
        .and_then(|pad| input_size.checked_add(pad))?;
    if effective_size < kernel_size {
        return None;
    }
    Some((effective_size - kernel_size) / stride + 1)
}

/// Predict the output resolution of a square 2D window operation.
///
/// This is [`maybe_conv1d_output_size`] applied to both spatial dimensions.
///
/// # Arguments
///
/// - `input_resolution`: ``[height, width]``.
/// - `kernel_size`: The (square) kernel size.
/// - `stride`: The stride, shared by both dimensions.
/// - `padding`: The padding, shared by both dimensions.
///
/// # Returns
///
/// ``Some([out_height, out_width])``; or `None` if either dimension collapses.
pub fn maybe_conv2d_output_resolution(
    input_resolution: [usize; 2],
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> Option<[usize; 2]> {
    let [height, width] = input_resolution;
    Some([
        maybe_conv1d_output_size(height, kernel_size, stride, padding)?,
        maybe_conv1d_output_size(width, kernel_size, stride, padding)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv1d_output_size() {
        fn conv1d_output_size_reference(
            input_size: usize,
            kernel_size: usize,
            stride: usize,
            padding: usize,
        ) -> Option<usize> {
            let input_size = input_size as f64;
            let kernel_size = kernel_size as f64;
            let stride = stride as f64;
            let padding = padding as f64;

            let x = (((input_size + 2.0 * padding - kernel_size) / stride) + 1.0).floor();
            if x < 1.0 { None } else { Some(x as usize) }
        }

        for input_size in 1..10 {
            for stride in 1..3 {
                for kernel_size in 1..8 {
                    for padding in 0..4 {
                        assert_eq!(
                            maybe_conv1d_output_size(input_size, kernel_size, stride, padding),
                            conv1d_output_size_reference(input_size, kernel_size, stride, padding),
                            "input_size:{input_size} kernel_size:{kernel_size} stride:{stride} padding:{padding}",
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_resnet_stem_sizes() {
        // 7x7/2 stem conv.
        assert_eq!(maybe_conv1d_output_size(224, 7, 2, 3), Some(112));
        // 3x3/2 max pool over the explicitly padded (112 + 2) map.
        assert_eq!(maybe_conv1d_output_size(114, 3, 2, 0), Some(56));
    }

    #[test]
    fn test_degenerate_sizes() {
        assert_eq!(maybe_conv1d_output_size(0, 1, 1, 0), None);
        assert_eq!(maybe_conv1d_output_size(2, 7, 2, 0), None);
        assert_eq!(maybe_conv1d_output_size(4, 3, 0, 1), None);
        assert_eq!(maybe_conv1d_output_size(1, 7, 2, 3), Some(1));
    }

    #[test]
    fn test_overflowing_sizes() {
        assert_eq!(maybe_conv1d_output_size(usize::MAX, 7, 2, 3), None);
        assert_eq!(maybe_conv1d_output_size(8, 3, 1, usize::MAX / 2 + 1), None);
        assert_eq!(
            maybe_conv1d_output_size(usize::MAX, 1, 1, 0),
            Some(usize::MAX)
        );
        assert_eq!(
            maybe_conv2d_output_resolution([usize::MAX, 224], 7, 2, 3),
            None
        );
    }

    #[test]
    fn test_conv2d_output_resolution() {
        assert_eq!(
            maybe_conv2d_output_resolution([224, 160], 7, 2, 3),
            Some([112, 80])
        );
        assert_eq!(maybe_conv2d_output_resolution([224, 0], 7, 2, 3), None);
    }
}
