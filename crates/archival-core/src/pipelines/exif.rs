//! EXIF extraction and normalization (§4.6 step 5).
//!
//! Raw EXIF is a flat bag of tags; the manifest wants it grouped into
//! `identity, capture, camera, exposure, image, software, file` with nulls
//! dropped. When the buffer carries no EXIF segment at all (common for PNG
//! and some TIFFs), extraction returns an empty object rather than an
//! error — EXIF is enrichment, not a required input.

use exif::{In, Reader, Tag, Value};
use serde_json::{json, Map, Value as Json};
use std::io::Cursor;

fn tag_string(fields: &exif::Exif, tag: Tag) -> Option<String> {
    fields.get_field(tag, In::PRIMARY).map(|f| f.display_value().with_unit(fields).to_string())
}

fn tag_f64(fields: &exif::Exif, tag: Tag) -> Option<f64> {
    let field = fields.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Rational(values) => values.first().map(|r| r.to_f64()),
        Value::SRational(values) => values.first().map(|r| r.to_f64()),
        _ => field.display_value().to_string().parse().ok(),
    }
}

fn insert_if_some(map: &mut Map<String, Json>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        if !value.is_empty() {
            map.insert(key.to_string(), Json::String(value));
        }
    }
}

/// Parse and group EXIF fields from a decoded buffer. Returns `{}` (not an
/// error) if the buffer carries no readable EXIF segment.
pub fn extract_normalized_exif(data: &[u8]) -> Json {
    let fields = match Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(fields) => fields,
        Err(_) => return json!({}),
    };

    let mut identity = Map::new();
    insert_if_some(&mut identity, "image_unique_id", tag_string(&fields, Tag::ImageUniqueID));

    let mut capture = Map::new();
    insert_if_some(&mut capture, "date_time_original", tag_string(&fields, Tag::DateTimeOriginal));
    insert_if_some(&mut capture, "date_time_digitized", tag_string(&fields, Tag::DateTimeDigitized));
    insert_if_some(&mut capture, "offset_time_original", tag_string(&fields, Tag::OffsetTimeOriginal));
    insert_if_some(&mut capture, "gps_latitude", tag_string(&fields, Tag::GPSLatitude));
    insert_if_some(&mut capture, "gps_longitude", tag_string(&fields, Tag::GPSLongitude));

    let mut camera = Map::new();
    insert_if_some(&mut camera, "make", tag_string(&fields, Tag::Make));
    insert_if_some(&mut camera, "model", tag_string(&fields, Tag::Model));
    insert_if_some(&mut camera, "lens_model", tag_string(&fields, Tag::LensModel));
    insert_if_some(&mut camera, "body_serial_number", tag_string(&fields, Tag::BodySerialNumber));

    let mut exposure = Map::new();
    if let Some(v) = tag_f64(&fields, Tag::ExposureTime) {
        exposure.insert("exposure_time".to_string(), json!(v));
    }
    if let Some(v) = tag_f64(&fields, Tag::FNumber) {
        exposure.insert("f_number".to_string(), json!(v));
    }
    if let Some(v) = tag_f64(&fields, Tag::FocalLength) {
        exposure.insert("focal_length".to_string(), json!(v));
    }
    insert_if_some(&mut exposure, "iso_speed_ratings", tag_string(&fields, Tag::PhotographicSensitivity));
    insert_if_some(&mut exposure, "exposure_program", tag_string(&fields, Tag::ExposureProgram));
    insert_if_some(&mut exposure, "metering_mode", tag_string(&fields, Tag::MeteringMode));
    insert_if_some(&mut exposure, "flash", tag_string(&fields, Tag::Flash));
    insert_if_some(&mut exposure, "white_balance", tag_string(&fields, Tag::WhiteBalance));

    let mut image = Map::new();
    insert_if_some(&mut image, "orientation", tag_string(&fields, Tag::Orientation));
    insert_if_some(&mut image, "x_resolution", tag_string(&fields, Tag::XResolution));
    insert_if_some(&mut image, "y_resolution", tag_string(&fields, Tag::YResolution));
    insert_if_some(&mut image, "color_space", tag_string(&fields, Tag::ColorSpace));
    insert_if_some(&mut image, "pixel_x_dimension", tag_string(&fields, Tag::PixelXDimension));
    insert_if_some(&mut image, "pixel_y_dimension", tag_string(&fields, Tag::PixelYDimension));

    let mut software = Map::new();
    insert_if_some(&mut software, "software", tag_string(&fields, Tag::Software));
    insert_if_some(&mut software, "artist", tag_string(&fields, Tag::Artist));
    insert_if_some(&mut software, "copyright", tag_string(&fields, Tag::Copyright));

    let mut file = Map::new();
    file.insert("byte_size".to_string(), json!(data.len()));

    let mut groups = Map::new();
    for (name, group) in [
        ("identity", identity),
        ("capture", capture),
        ("camera", camera),
        ("exposure", exposure),
        ("image", image),
        ("software", software),
        ("file", file),
    ] {
        if !group.is_empty() {
            groups.insert(name.to_string(), Json::Object(group));
        }
    }

    Json::Object(groups)
}

/// EXIF orientation value (1-8), if present, for the viewing derivative's
/// auto-rotation step. Defaults to `1` (no transform needed) when absent.
pub fn orientation(data: &[u8]) -> u32 {
    let fields = match Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(fields) => fields,
        Err(_) => return 1,
    };

    fields
        .get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_normalized_exif_returns_empty_object_without_segment() {
        let data = vec![0u8; 32];
        let exif = extract_normalized_exif(&data);
        assert_eq!(exif, json!({}));
    }

    #[test]
    fn test_orientation_defaults_to_one_without_exif() {
        assert_eq!(orientation(&[0u8; 16]), 1);
    }
}
