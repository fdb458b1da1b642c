use crate::classifier::{ArmSide, MotionStatus};
use crate::config::RecordingConfig;
use crate::frame::Frame;
use crate::perception::BoundingBox;
use tracing::{debug, warn};

#[cfg(feature = "annotation")]
use image::{Rgb, RgbImage};
#[cfg(feature = "annotation")]
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
#[cfg(feature = "annotation")]
use imageproc::rect::Rect;
#[cfg(feature = "annotation")]
use rusttype::{Font, Scale};

pub const ACTIVE_COLOR: [u8; 3] = [255, 0, 0];
pub const IDLE_COLOR: [u8; 3] = [0, 255, 0];

/// One box to draw on a frame
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub bbox: BoundingBox,
    pub label: String,
    pub color: [u8; 3],
}

impl Overlay {
    /// Box label in the form `ID:<id> <STATUS> <arm>:<angle>`
    pub fn for_track(
        bbox: BoundingBox,
        track_id: Option<u32>,
        status: MotionStatus,
        arm: ArmSide,
        angle: f32,
    ) -> Self {
        let id = track_id.map_or_else(|| "-".to_string(), |id| id.to_string());
        let color = if status == MotionStatus::Active {
            ACTIVE_COLOR
        } else {
            IDLE_COLOR
        };

        Self {
            bbox,
            label: format!("ID:{} {} {}:{}", id, status, arm, angle as i32),
            color,
        }
    }
}

/// Draws detection boxes and labels onto copies of captured frames
pub struct Annotator {
    #[cfg(feature = "annotation")]
    font: Option<Font<'static>>,
    #[cfg(feature = "annotation")]
    scale: Scale,
}

impl Annotator {
    /// Load the label font; boxes are still drawn if it is missing
    pub fn new(config: &RecordingConfig) -> Self {
        #[cfg(feature = "annotation")]
        {
            let font = match std::fs::read(&config.font_path) {
                Ok(data) => Font::try_from_vec(data),
                Err(e) => {
                    warn!(
                        "Failed to read font file '{}': {}, labels disabled",
                        config.font_path, e
                    );
                    None
                }
            };
            if font.is_none() {
                debug!("Annotating boxes without labels");
            }

            Self {
                font,
                scale: Scale::uniform(config.font_size),
            }
        }

        #[cfg(not(feature = "annotation"))]
        {
            warn!(
                "Annotation support not compiled in, recording raw frames (font {} unused)",
                config.font_path
            );
            Self {}
        }
    }

    /// Annotator that draws boxes only
    pub fn without_labels() -> Self {
        Self {
            #[cfg(feature = "annotation")]
            font: None,
            #[cfg(feature = "annotation")]
            scale: Scale::uniform(16.0),
        }
    }

    pub fn has_labels(&self) -> bool {
        #[cfg(feature = "annotation")]
        {
            self.font.is_some()
        }
        #[cfg(not(feature = "annotation"))]
        {
            false
        }
    }

    /// Return a new frame with every overlay drawn; the input is untouched
    pub fn annotate(&self, frame: &Frame, overlays: &[Overlay]) -> Frame {
        if overlays.is_empty() {
            return frame.clone();
        }

        #[cfg(feature = "annotation")]
        {
            let mut img = match RgbImage::from_raw(frame.width, frame.height, frame.data.to_vec()) {
                Some(img) => img,
                None => {
                    warn!(
                        "Frame {} has {} bytes for {}x{}, skipping annotation",
                        frame.index,
                        frame.data.len(),
                        frame.width,
                        frame.height
                    );
                    return frame.clone();
                }
            };

            for overlay in overlays {
                self.draw(&mut img, overlay);
            }

            frame.with_data(img.into_raw())
        }

        #[cfg(not(feature = "annotation"))]
        {
            frame.clone()
        }
    }

    #[cfg(feature = "annotation")]
    fn draw(&self, img: &mut RgbImage, overlay: &Overlay) {
        let color = Rgb(overlay.color);
        let (max_x, max_y) = (img.width() as f32 - 1.0, img.height() as f32 - 1.0);
        if max_x < 0.0 || max_y < 0.0 {
            return;
        }

        let x1 = overlay.bbox.x1.clamp(0.0, max_x) as i32;
        let y1 = overlay.bbox.y1.clamp(0.0, max_y) as i32;
        let x2 = overlay.bbox.x2.clamp(0.0, max_x) as i32;
        let y2 = overlay.bbox.y2.clamp(0.0, max_y) as i32;

        // 2px outline: outer rectangle plus one inset by a pixel
        for inset in 0..2 {
            let w = x2 - x1 + 1 - 2 * inset;
            let h = y2 - y1 + 1 - 2 * inset;
            if w > 0 && h > 0 {
                let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
                draw_hollow_rect_mut(img, rect, color);
            }
        }

        if let Some(font) = &self.font {
            let text_y = (y1 - 10 - self.scale.y as i32).max(0);
            draw_text_mut(img, color, x1, text_y, self.scale, font, &overlay.label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn black_frame(width: u32, height: u32) -> Frame {
        Frame::new(
            3,
            SystemTime::now(),
            vec![0u8; (width * height * 3) as usize],
            width,
            height,
        )
    }

    #[test]
    fn test_label_format() {
        let overlay = Overlay::for_track(
            BoundingBox::new(0.0, 0.0, 5.0, 5.0),
            Some(12),
            MotionStatus::Active,
            ArmSide::Right,
            97.8,
        );
        assert_eq!(overlay.label, "ID:12 ACTIVE R:97");
        assert_eq!(overlay.color, ACTIVE_COLOR);

        let idle = Overlay::for_track(
            BoundingBox::new(0.0, 0.0, 5.0, 5.0),
            None,
            MotionStatus::Analyzing,
            ArmSide::None,
            0.0,
        );
        assert_eq!(idle.label, "ID:- ANALYZING none:0");
        assert_eq!(idle.color, IDLE_COLOR);
    }

    #[test]
    fn test_annotate_leaves_input_untouched() {
        let frame = black_frame(20, 20);
        let overlay = Overlay::for_track(
            BoundingBox::new(2.0, 2.0, 12.0, 12.0),
            Some(1),
            MotionStatus::Active,
            ArmSide::None,
            0.0,
        );

        let annotated = Annotator::without_labels().annotate(&frame, &[overlay]);

        assert!(frame.data.iter().all(|&b| b == 0));
        assert_eq!(annotated.index, frame.index);
        assert_eq!(annotated.data.len(), frame.data.len());

        #[cfg(feature = "annotation")]
        {
            let pixel = |x: usize, y: usize| {
                let at = (y * 20 + x) * 3;
                [annotated.data[at], annotated.data[at + 1], annotated.data[at + 2]]
            };
            assert_eq!(pixel(2, 2), ACTIVE_COLOR);
            assert_eq!(pixel(3, 3), ACTIVE_COLOR);
            assert_eq!(pixel(12, 7), ACTIVE_COLOR);
            assert_eq!(pixel(7, 7), [0, 0, 0]);
        }
    }

    #[test]
    fn test_out_of_frame_box_is_clamped() {
        let frame = black_frame(8, 8);
        let overlay = Overlay::for_track(
            BoundingBox::new(-50.0, -50.0, 500.0, 500.0),
            Some(1),
            MotionStatus::Static,
            ArmSide::Left,
            45.0,
        );

        let annotated = Annotator::without_labels().annotate(&frame, &[overlay]);
        assert_eq!(annotated.data.len(), frame.data.len());
    }

    #[test]
    fn test_missing_font_disables_labels() {
        let mut config = crate::config::PosewatchConfig::default().recording;
        config.font_path = "/nonexistent/font.ttf".to_string();

        let annotator = Annotator::new(&config);
        assert!(!annotator.has_labels());
    }
}
