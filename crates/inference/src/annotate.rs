use crate::postprocessing::Detection;
use ab_glyph::{FontVec, PxScale};
use anyhow::Context;
use common::span;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_PADDING: i32 = 2;
const MIN_LINE_WIDTH: u32 = 2;

/// Caption font used when no `font_path` is configured.
const DEFAULT_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Per-class box colors, cycled by class id.
const PALETTE: [[u8; 3]; 20] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [146, 204, 23],
    [61, 219, 134],
    [26, 147, 52],
    [0, 212, 187],
    [44, 153, 168],
    [0, 194, 255],
    [52, 69, 147],
    [100, 115, 255],
    [0, 24, 236],
    [132, 56, 255],
    [82, 0, 133],
    [203, 56, 255],
    [255, 149, 200],
    [255, 55, 199],
];

pub fn class_color(class_id: u32) -> Rgb<u8> {
    Rgb(PALETTE[class_id as usize % PALETTE.len()])
}

/// Draws detection boxes and `label confidence` captions onto an image.
///
/// Built with [`Annotator::new`]`(None)` only the boxes are drawn.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    /// Annotator using the bundled DejaVu Sans font.
    pub fn with_default_font() -> anyhow::Result<Self> {
        let font = FontVec::try_from_vec(DEFAULT_FONT.to_vec())
            .context("bundled label font is invalid")?;
        Ok(Self::new(Some(font)))
    }

    /// `path` overrides the bundled font.
    pub fn from_font_path(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            tracing::info!("Using bundled label font");
            return Self::with_default_font();
        };
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontVec::try_from_vec(data)
            .with_context(|| format!("invalid font file {}", path.display()))?;
        tracing::info!(font = %path.display(), "Loaded label font");
        Ok(Self::new(Some(font)))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw all detections in place. Image dimensions never change.
    pub fn draw(&self, image: &mut RgbImage, detections: &[Detection]) {
        let _s = span!("annotate");

        if image.width() == 0 || image.height() == 0 {
            return;
        }

        let line_width = line_width(image.width(), image.height());
        let font_scale = PxScale::from((line_width * 6).max(12) as f32);

        for detection in detections {
            let color = class_color(detection.class_id);
            let Some(rect) = pixel_rect(image, detection) else {
                continue;
            };

            for inset in 0..line_width as i32 {
                let w = rect.width() as i32 - 2 * inset;
                let h = rect.height() as i32 - 2 * inset;
                if w <= 0 || h <= 0 {
                    break;
                }
                let ring = Rect::at(rect.left() + inset, rect.top() + inset).of_size(w as u32, h as u32);
                draw_hollow_rect_mut(image, ring, color);
            }

            if let Some(font) = &self.font {
                let caption = format!("{} {:.2}", detection.label, detection.confidence);
                let (text_w, text_h) = text_size(font_scale, font, &caption);
                let bar_w = text_w + 2 * LABEL_PADDING as u32;
                let bar_h = text_h + 2 * LABEL_PADDING as u32;

                // Caption sits above the box, or inside it when at the top edge.
                let bar_y = if rect.top() >= bar_h as i32 {
                    rect.top() - bar_h as i32
                } else {
                    rect.top()
                };

                draw_filled_rect_mut(image, Rect::at(rect.left(), bar_y).of_size(bar_w, bar_h), color);
                draw_text_mut(
                    image,
                    LABEL_TEXT_COLOR,
                    rect.left() + LABEL_PADDING,
                    bar_y + LABEL_PADDING,
                    font_scale,
                    font,
                    &caption,
                );
            }
        }
    }
}

/// Line width proportional to the image size, as common YOLO renderers do.
fn line_width(width: u32, height: u32) -> u32 {
    (((width + height) as f32 / 2.0 * 0.003).round() as u32).max(MIN_LINE_WIDTH)
}

fn pixel_rect(image: &RgbImage, detection: &Detection) -> Option<Rect> {
    let max_x = image.width() as i32 - 1;
    let max_y = image.height() as i32 - 1;

    let x1 = (detection.x1.floor() as i32).clamp(0, max_x);
    let y1 = (detection.y1.floor() as i32).clamp(0, max_y);
    let x2 = (detection.x2.ceil() as i32).clamp(0, max_x);
    let y2 = (detection.y2.ceil() as i32).clamp(0, max_y);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x1: f32, y1: f32, x2: f32, y2: f32, class_id: u32) -> Detection {
        Detection {
            x1,
            y1,
            x2,
            y2,
            confidence: 0.9,
            class_id,
            label: "person".to_string(),
        }
    }

    #[test]
    fn test_line_width_scales_with_image() {
        assert_eq!(line_width(100, 100), 2);
        assert_eq!(line_width(2000, 2000), 6);
    }

    #[test]
    fn test_draw_keeps_dimensions_and_colors_border() {
        let mut image = RgbImage::from_pixel(640, 480, Rgb([0, 0, 0]));
        let annotator = Annotator::new(None);

        annotator.draw(&mut image, &[detection(100.0, 100.0, 200.0, 150.0, 0)]);

        assert_eq!(image.dimensions(), (640, 480));
        assert_eq!(*image.get_pixel(100, 100), class_color(0), "Top-left corner drawn");
        assert_eq!(*image.get_pixel(150, 150), class_color(0), "Bottom edge drawn");
        assert_eq!(*image.get_pixel(101, 125), class_color(0), "Inner ring of thick line");
        assert_eq!(*image.get_pixel(150, 125), Rgb([0, 0, 0]), "Interior untouched");
    }

    #[test]
    fn test_draw_without_detections_is_noop() {
        let original = RgbImage::from_pixel(32, 16, Rgb([7, 8, 9]));
        let mut image = original.clone();

        Annotator::new(None).draw(&mut image, &[]);

        assert_eq!(image, original);
    }

    #[test]
    fn test_out_of_bounds_and_degenerate_boxes_are_safe() {
        let mut image = RgbImage::from_pixel(50, 50, Rgb([0, 0, 0]));
        let annotator = Annotator::new(None);

        annotator.draw(
            &mut image,
            &[
                detection(-20.0, -20.0, 500.0, 500.0, 3),
                detection(10.0, 10.0, 10.0, 30.0, 1),
                detection(60.0, 60.0, 80.0, 80.0, 2),
            ],
        );

        assert_eq!(image.dimensions(), (50, 50));
        assert_eq!(*image.get_pixel(0, 0), class_color(3));
        assert_eq!(*image.get_pixel(49, 49), class_color(3));
    }

    #[test]
    fn test_class_colors_cycle() {
        assert_eq!(class_color(0), class_color(20));
        assert_ne!(class_color(0), class_color(1));
    }

    #[test]
    fn test_missing_font_file_is_an_error() {
        let result = Annotator::from_font_path(Some(Path::new("/nonexistent/font.ttf")));
        assert!(result.is_err());
    }

    #[test]
    fn test_bundled_font_draws_caption_above_box() {
        let annotator = Annotator::from_font_path(None).unwrap();
        assert!(annotator.has_font());

        let mut image = RgbImage::from_pixel(640, 480, Rgb([0, 0, 0]));
        annotator.draw(&mut image, &[detection(100.0, 200.0, 300.0, 400.0, 0)]);

        // Caption bar is filled with the class color right above the top edge.
        assert_eq!(*image.get_pixel(101, 198), class_color(0));
        // White text over the red bar raises the green channel.
        let text_pixels = (100..300)
            .flat_map(|x| (150..200).map(move |y| (x, y)))
            .filter(|&(x, y)| image.get_pixel(x, y)[1] > 150)
            .count();
        assert!(text_pixels > 0, "Caption text is rendered");
        assert_eq!(*image.get_pixel(200, 300), Rgb([0, 0, 0]), "Interior untouched");
    }
}
