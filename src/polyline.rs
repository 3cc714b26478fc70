//! Decoder for Google's Encoded Polyline Algorithm Format.
//!
//! Coordinates arrive as printable ASCII: each signed delta is split into
//! 5-bit groups (low group first), each group offset by 63, with 0x20 as
//! the continuation flag. Deltas alternate latitude/longitude and
//! accumulate; an odd magnitude marks a negative delta via bitwise
//! complement. Scale is 1e-5 degrees.

use thiserror::Error;

/// The encoded string ended in the middle of a delta.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("encoded polyline ends mid-delta at byte {offset}")]
pub struct MalformedPolyline {
    pub offset: usize,
}

/// One decoded coordinate pair, degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

/// Decodes an encoded polyline into its coordinate sequence.
///
/// Pure function: repeated calls on the same input yield the same output.
///
/// # Errors
///
/// [`MalformedPolyline`] if the string ends mid-delta, including after a
/// latitude delta whose longitude partner never arrives.
pub fn decode(encoded: &str) -> Result<Vec<LatLng>, MalformedPolyline> {
    let bytes = encoded.as_bytes();
    let mut coordinates = Vec::new();
    let mut pos = 0usize;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while pos < bytes.len() {
        lat += read_delta(bytes, &mut pos)?;
        lng += read_delta(bytes, &mut pos)?;
        coordinates.push(LatLng {
            latitude: lat as f64 / 1e5,
            longitude: lng as f64 / 1e5,
        });
    }

    Ok(coordinates)
}

/// Reads one signed delta starting at `*pos`, advancing past it.
fn read_delta(bytes: &[u8], pos: &mut usize) -> Result<i64, MalformedPolyline> {
    let start = *pos;
    let mut result: i64 = 0;
    let mut shift = 0u32;

    loop {
        let Some(&byte) = bytes.get(*pos) else {
            return Err(MalformedPolyline { offset: start });
        };
        *pos += 1;

        let chunk = i64::from(byte) - 63;
        if shift >= 64 {
            return Err(MalformedPolyline { offset: start });
        }
        result |= (chunk & 0x1f) << shift;
        shift += 5;

        if chunk & 0x20 == 0 {
            break;
        }
    }

    // Odd magnitude marks a negative delta stored as its complement.
    if result & 1 != 0 {
        Ok(!(result >> 1))
    } else {
        Ok(result >> 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty_string() {
        assert_eq!(decode("").unwrap(), vec![]);
    }

    #[test]
    fn test_decode_reference_vector() {
        // Published test vector for the format.
        let points = decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
        let expected = [(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)];

        assert_eq!(points.len(), expected.len());
        for (point, (lat, lng)) in points.iter().zip(expected) {
            assert!((point.latitude - lat).abs() < 1e-9, "lat {point:?}");
            assert!((point.longitude - lng).abs() < 1e-9, "lng {point:?}");
        }
    }

    #[test]
    fn test_decode_single_point() {
        let points = decode("_p~iF~ps|U").unwrap();
        assert_eq!(points.len(), 1);
        assert!((points[0].latitude - 38.5).abs() < 1e-9);
        assert!((points[0].longitude + 120.2).abs() < 1e-9);
    }

    #[test]
    fn test_decode_truncated_mid_delta() {
        // '_' (0x5f) has the 0x20 continuation bit set after the -63 offset.
        let err = decode("_").unwrap_err();
        assert_eq!(err, MalformedPolyline { offset: 0 });
    }

    #[test]
    fn test_decode_missing_longitude_delta() {
        // A complete latitude delta with no longitude following.
        let err = decode("_p~iF").unwrap_err();
        assert_eq!(err.offset, 5);
    }

    #[test]
    fn test_decode_is_restartable() {
        let encoded = "_p~iF~ps|U_ulLnnqC";
        assert_eq!(decode(encoded).unwrap(), decode(encoded).unwrap());
    }
}
