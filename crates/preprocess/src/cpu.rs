use crate::PreprocessResult;
use crate::config::{DEFAULT_INPUT_SIZE, LETTERBOX_COLOR};
use common::{span, span_debug};
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use image::RgbImage;
use ndarray::{Array, IxDyn};

/// Letterboxes RGB images into a fixed square (or rectangular) model input
/// and converts them to a normalized NCHW tensor.
///
/// The padded buffer is kept between calls so repeated detections on images
/// of any size reuse the same allocation.
pub struct CpuPreProcessor {
    pub input_size: (u32, u32),
    letterboxed_buffer: Vec<u8>,
}

impl CpuPreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            letterboxed_buffer: vec![LETTERBOX_COLOR; (input_size.0 * input_size.1 * 3) as usize],
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    pub fn preprocess_image(&mut self, image: &RgbImage) -> anyhow::Result<PreprocessResult> {
        self.preprocess(image.as_raw(), image.width(), image.height())
    }

    /// Preprocess packed RGB (HWC) pixel data.
    pub fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult> {
        let _s = span!("preprocess");

        tracing::trace!(
            width,
            height,
            pixel_bytes = pixels.len(),
            "Preprocessing image dimensions"
        );

        if width == 0 || height == 0 {
            anyhow::bail!("Cannot preprocess an empty {}x{} image", width, height);
        }

        let expected_size = (width as usize) * (height as usize) * 3;
        if pixels.len() != expected_size {
            anyhow::bail!(
                "Buffer size mismatch: expected {}, got {} bytes",
                expected_size,
                pixels.len()
            );
        }

        let (scale, offset_x, offset_y, letterboxed) =
            self.resize_and_letterbox(pixels, width, height)?;

        let tensor = Self::normalize(&letterboxed)?;

        Ok(PreprocessResult {
            tensor,
            scale,
            offset_x,
            offset_y,
        })
    }

    fn resize_and_letterbox(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<(f32, f32, f32, Image<'_>)> {
        let _s = span_debug!("resize_and_letterbox");

        let scale =
            (self.input_size.0 as f32 / width as f32).min(self.input_size.1 as f32 / height as f32);
        // Extreme aspect ratios must still keep one row/column of content.
        let new_width = ((width as f32 * scale) as u32).clamp(1, self.input_size.0);
        let new_height = ((height as f32 * scale) as u32).clamp(1, self.input_size.1);

        let offset_x = (self.input_size.0 - new_width) / 2;
        let offset_y = (self.input_size.1 - new_height) / 2;

        let src = ImageRef::new(width, height, pixels, PixelType::U8x3)?;

        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        Resizer::new().resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let stride = self.input_size.0 * 3;
        let row_len = (new_width * 3) as usize;

        for y in 0..new_height {
            let src_row = (y * new_width * 3) as usize;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;

            self.letterboxed_buffer[dst_row..dst_row + row_len]
                .copy_from_slice(&resized_data[src_row..src_row + row_len]);
        }

        let final_img = Image::from_slice_u8(
            self.input_size.0,
            self.input_size.1,
            &mut self.letterboxed_buffer,
            PixelType::U8x3,
        )?;

        Ok((scale, offset_x as f32, offset_y as f32, final_img))
    }

    fn normalize(image: &Image) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span_debug!("normalize");

        let width = image.width() as usize;
        let height = image.height() as usize;
        let spatial = width * height;

        let mut output = vec![0.0f32; 3 * spatial];
        let buf = image.buffer();

        for (i, px) in buf.chunks_exact(3).enumerate() {
            output[i] = px[0] as f32 / 255.0;
            output[i + spatial] = px[1] as f32 / 255.0;
            output[i + 2 * spatial] = px[2] as f32 / 255.0;
        }

        Ok(Array::from_shape_vec(
            IxDyn(&[1, 3, height, width]),
            output,
        )?)
    }
}

impl Default for CpuPreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_rgb_preprocessing_output_shape() {
        let pixels = vec![
            255, 0, 0, // Red pixel
            0, 255, 0, // Green pixel
            0, 0, 255, // Blue pixel
            255, 255, 255, // White pixel
        ];

        let mut preprocessor = CpuPreProcessor::default();
        let result = preprocessor.preprocess(&pixels, 2, 2);

        assert!(result.is_ok(), "RGB preprocessing should succeed");
        assert_eq!(result.unwrap().tensor.shape(), &[1, 3, 640, 640]);
    }

    #[test]
    fn test_buffer_size_mismatch_detection() {
        let pixels = vec![0u8; 200]; // Wrong size for 10x10

        let mut preprocessor = CpuPreProcessor::default();
        let result = preprocessor.preprocess(&pixels, 10, 10);

        assert!(result.is_err(), "Size mismatch should return error");
        assert!(
            result.unwrap_err().to_string().contains("mismatch"),
            "Error should mention mismatch"
        );
    }

    #[test]
    fn test_zero_sized_image_rejected() {
        let mut preprocessor = CpuPreProcessor::default();
        assert!(preprocessor.preprocess(&[], 0, 10).is_err());
        assert!(preprocessor.preprocess(&[], 10, 0).is_err());
    }

    #[test]
    fn test_letterboxing_preserves_aspect_ratio() {
        // 800x600 image (4:3 aspect ratio)
        let pixels = vec![128u8; 800 * 600 * 3];

        let mut preprocessor = CpuPreProcessor::default();
        let result = preprocessor.preprocess(&pixels, 800, 600).unwrap();

        // Scale should be min(640/800, 640/600) = 0.8
        assert_eq!(result.scale, 0.8, "Scale should preserve aspect ratio");

        // Resized: 640x480, so the padding is 80 rows on each side
        assert_eq!(result.offset_x, 0.0, "X offset should be 0 for wide image");
        assert_eq!(result.offset_y, 80.0, "Y offset should center vertically");

        assert_eq!(result.tensor.shape(), &[1, 3, 640, 640]);
    }

    #[test]
    fn test_padding_and_content_values() {
        let pixels = vec![255u8; 800 * 600 * 3];

        let mut preprocessor = CpuPreProcessor::default();
        let result = preprocessor.preprocess(&pixels, 800, 600).unwrap();
        let tensor = result.tensor;

        let padding = LETTERBOX_COLOR as f32 / 255.0;
        assert!((tensor[[0, 0, 10, 320]] - padding).abs() < 1e-6, "Top band is padding");
        assert!((tensor[[0, 2, 630, 320]] - padding).abs() < 1e-6, "Bottom band is padding");
        assert!((tensor[[0, 1, 320, 320]] - 1.0).abs() < 1e-2, "Center is white content");
    }

    #[test]
    fn test_tall_image_is_centered_horizontally() {
        let image = RgbImage::from_pixel(320, 640, Rgb([10, 20, 30]));

        let mut preprocessor = CpuPreProcessor::default();
        let result = preprocessor.preprocess_image(&image).unwrap();

        // Scale = min(640/320, 640/640) = 1.0; width stays 320
        assert_eq!(result.scale, 1.0);
        assert_eq!(result.offset_x, 160.0);
        assert_eq!(result.offset_y, 0.0);

        let tensor = result.tensor;
        assert!((tensor[[0, 0, 320, 320]] - 10.0 / 255.0).abs() < 1e-3);
        assert!((tensor[[0, 1, 320, 320]] - 20.0 / 255.0).abs() < 1e-3);
        assert!((tensor[[0, 2, 320, 320]] - 30.0 / 255.0).abs() < 1e-3);
    }

    #[test]
    fn test_extreme_aspect_ratio_keeps_content() {
        let image = RgbImage::from_pixel(4000, 1, Rgb([200, 200, 200]));

        let mut preprocessor = CpuPreProcessor::default();
        let result = preprocessor.preprocess_image(&image).unwrap();

        assert_eq!(result.tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(result.offset_x, 0.0);
        assert!(result.offset_y > 300.0);
    }

    #[test]
    fn test_custom_input_size() {
        let image = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));

        let mut preprocessor = CpuPreProcessor::new((320, 320));
        let result = preprocessor.preprocess_image(&image).unwrap();

        assert_eq!(preprocessor.input_size(), (320, 320));
        assert_eq!(result.tensor.shape(), &[1, 3, 320, 320]);
        assert_eq!(result.scale, 3.2);
    }
}
