use std::sync::Arc;
use std::time::SystemTime;

/// Bytes per pixel of the packed RGB24 layout every source delivers
pub const RGB24_BYTES_PER_PIXEL: usize = 3;

/// Captured frame: packed RGB24 pixels plus capture metadata
#[derive(Debug, Clone)]
pub struct Frame {
    /// Capture index, restarting at 0 when a looping source rewinds
    pub index: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Pixel data (shared, never mutated after capture)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Frame {
    pub fn new(index: u64, timestamp: SystemTime, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            index,
            timestamp,
            data: Arc::new(data),
            width,
            height,
        }
    }

    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * RGB24_BYTES_PER_PIXEL
    }

    /// Validate frame data size against the RGB24 layout
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Derive a frame carrying new pixels but the same capture metadata
    pub fn with_data(&self, data: Vec<u8>) -> Self {
        Self {
            index: self.index,
            timestamp: self.timestamp,
            data: Arc::new(data),
            width: self.width,
            height: self.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(1, SystemTime::now(), vec![0u8; 640 * 480 * 3], 640, 480);

        assert_eq!(frame.index, 1);
        assert_eq!(frame.width, 640);
        assert_eq!(frame.height, 480);
        assert!(frame.validate_size());
    }

    #[test]
    fn test_frame_size_validation() {
        let invalid = Frame::new(2, SystemTime::now(), vec![0u8; 100], 640, 480);
        assert!(!invalid.validate_size());
    }

    #[test]
    fn test_with_data_keeps_metadata() {
        let original = Frame::new(7, SystemTime::now(), vec![0u8; 12], 2, 2);
        let annotated = original.with_data(vec![255u8; 12]);

        assert_eq!(annotated.index, 7);
        assert_eq!(annotated.timestamp, original.timestamp);
        assert_eq!(original.data[0], 0);
        assert_eq!(annotated.data[0], 255);
    }
}
