// dataload-core/src/format/image.rs

//! Encoded images (PNG, JPEG) decoded into `uint8` tensors in NHWC layout.
//!
//! Each image is decoded, optionally resized so that its shorter edge has
//! the configured length, converted to the configured channel count and
//! center-cropped to the configured height and width.

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, Result};

/// Length of the metadata header preceding each image in MXNet image
/// RecordIO files.
pub const RECORDIO_IMAGE_HEADER_LEN: usize = 24;

/// How images are laid out in a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFrame {
    /// Every store holds exactly one image.
    #[default]
    None,
    /// Images are RecordIO records with a 24-byte image header.
    Recordio,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    pub image_frame: ImageFrame,
    /// Output dimensions as `[channels, height, width]`.
    pub image_dimensions: Vec<usize>,
    /// Length of the shorter edge after resizing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize: Option<u32>,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            image_frame: ImageFrame::None,
            image_dimensions: vec![3, 224, 224],
            resize: None,
        }
    }
}

impl ImageOptions {
    pub fn validate(&self) -> Result<()> {
        let [channels, height, width] = self.image_dimensions[..] else {
            return Err(ReaderError::config(
                "format.image_dimensions must be entered as [channels, height, width]",
            ));
        };
        if !matches!(channels, 1 | 3 | 4) {
            return Err(ReaderError::config(format!(
                "format.image_dimensions has an unsupported number of channels ({channels})"
            )));
        }
        if height == 0 || width == 0 {
            return Err(ReaderError::config("format.image_dimensions must be non-zero"));
        }
        if self.resize == Some(0) {
            return Err(ReaderError::config("format.resize must be greater than 0"));
        }
        Ok(())
    }
}

/// Size of an image resized so that its shorter edge is `edge` long.
#[cfg_attr(not(feature = "image"), allow(dead_code))]
fn resized_dims(width: u32, height: u32, edge: u32) -> (u32, u32) {
    let scale = |long: u32, short: u32| {
        (u64::from(edge) * u64::from(long) / u64::from(short.max(1))) as u32
    };
    if height > width {
        (edge, scale(height, width))
    } else {
        (scale(width, height), edge)
    }
}

/// Copies the centered `width` x `height` window out of interleaved pixels.
#[cfg_attr(not(feature = "image"), allow(dead_code))]
fn center_crop(
    pixels: &[u8],
    src_width: usize,
    src_height: usize,
    channels: usize,
    width: usize,
    height: usize,
) -> Option<Vec<u8>> {
    if src_width < width || src_height < height {
        return None;
    }
    let x = (src_width - width) / 2;
    let y = (src_height - height) / 2;

    let row_len = width * channels;
    let mut out = Vec::with_capacity(row_len * height);
    for row in y..y + height {
        let start = (row * src_width + x) * channels;
        out.extend_from_slice(pixels.get(start..start + row_len)?);
    }
    Some(out)
}

#[cfg(feature = "image")]
pub use parser::ImageParser;

#[cfg(feature = "image")]
mod parser {
    use std::sync::Arc;

    use image::imageops::FilterType;
    use image::GenericImageView;

    use super::{center_crop, resized_dims, ImageFrame, ImageOptions, RECORDIO_IMAGE_HEADER_LEN};
    use crate::error::{ReaderError, Result};
    use crate::format::recordio::RecordIoFraming;
    use crate::format::{Instance, RecordParser};
    use crate::schema::{Attribute, Schema};
    use crate::source::{Record, RecordFraming, RecordReader, WholeStoreFraming};
    use crate::tensor::{ArrayData, DataType, Value};

    #[derive(Debug)]
    pub struct ImageParser {
        frame: ImageFrame,
        channels: usize,
        height: usize,
        width: usize,
        resize: Option<u32>,
        schema: Arc<Schema>,
    }

    impl ImageParser {
        pub fn new(options: &ImageOptions, batch_size: usize) -> Result<Self> {
            options.validate()?;
            let (channels, height, width) = (
                options.image_dimensions[0],
                options.image_dimensions[1],
                options.image_dimensions[2],
            );
            let schema = Schema::new(vec![Attribute::new(
                "value",
                DataType::UInt8,
                vec![batch_size, height, width, channels],
            )])?;

            Ok(Self {
                frame: options.image_frame,
                channels,
                height,
                width,
                resize: options.resize,
                schema: Arc::new(schema),
            })
        }
    }

    impl RecordParser for ImageParser {
        fn name(&self) -> &'static str {
            "image"
        }

        fn framing(&self) -> Arc<dyn RecordFraming> {
            match self.frame {
                ImageFrame::None => Arc::new(WholeStoreFraming),
                ImageFrame::Recordio => Arc::new(RecordIoFraming),
            }
        }

        fn open_store(&self, _reader: &mut RecordReader) -> Result<()> {
            Ok(())
        }

        fn infer_schema(&self, _record: Option<&Record>) -> Result<Option<Arc<Schema>>> {
            Ok(Some(self.schema.clone()))
        }

        fn schema(&self) -> Option<Arc<Schema>> {
            Some(self.schema.clone())
        }

        fn parse(&self, record: &Record) -> Result<Instance> {
            let invalid = |message: String| {
                ReaderError::invalid_instance(record.store.as_ref(), record.index, message)
            };

            let encoded = match self.frame {
                ImageFrame::None => &record.payload[..],
                ImageFrame::Recordio => {
                    record.payload.get(RECORDIO_IMAGE_HEADER_LEN..).ok_or_else(|| {
                        invalid(format!(
                            "the record is shorter than the {RECORDIO_IMAGE_HEADER_LEN}-byte image header"
                        ))
                    })?
                }
            };

            let mut img = image::load_from_memory(encoded)
                .map_err(|e| invalid(format!("the image cannot be decoded: {e}")))?;

            if let Some(edge) = self.resize {
                let (w, h) = img.dimensions();
                let (new_w, new_h) = resized_dims(w, h, edge);
                img = img.resize_exact(new_w, new_h, FilterType::Triangle);
            }

            let (src_w, src_h) = img.dimensions();
            let pixels = match self.channels {
                1 => img.to_luma8().into_raw(),
                3 => img.to_rgb8().into_raw(),
                _ => img.to_rgba8().into_raw(),
            };

            let cropped = center_crop(
                &pixels,
                src_w as usize,
                src_h as usize,
                self.channels,
                self.width,
                self.height,
            )
            .ok_or_else(|| {
                invalid(format!(
                    "the image dimensions (height: {src_h}, width: {src_w}) are smaller than the \
                     output dimensions (height: {}, width: {})",
                    self.height, self.width
                ))
            })?;

            Ok(Instance {
                store: record.store.clone(),
                index: record.index,
                values: vec![Value::Array(ArrayData::UInt8(cropped))],
            })
        }
    }

}
