//! Face descriptor matching.
//!
//! Descriptors are produced in the browser by a pretrained face model; the
//! server only stores them and compares probes against the enrolled gallery.

/// Length of the descriptor emitted by the browser-side recognition model.
pub const DESCRIPTOR_LEN: usize = 128;

/// Distance under which two descriptors are considered the same person;
/// the default for the `face_match_threshold` setting.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceDescriptor(Vec<f32>);

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Result<Self, String> {
        if values.len() != DESCRIPTOR_LEN {
            return Err(format!(
                "face descriptor must have {DESCRIPTOR_LEN} values, got {}",
                values.len()
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err("face descriptor contains non-finite values".to_string());
        }
        Ok(Self(values))
    }

    pub fn euclidean_distance(&self, other: &FaceDescriptor) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Stored form in `users.face_descriptor`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn from_json(raw: &str) -> Result<Self, String> {
        let values: Vec<f32> = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        Self::new(values)
    }
}

/// An enrolled descriptor and the user it belongs to.
#[derive(Debug, Clone)]
pub struct EnrolledFace {
    pub user_id: u64,
    pub descriptor: FaceDescriptor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub user_id: u64,
    pub distance: f32,
}

/// Linear scan for the closest enrolled face; a match needs `distance < threshold`.
pub fn best_match(probe: &FaceDescriptor, gallery: &[EnrolledFace], threshold: f32) -> Option<FaceMatch> {
    let mut best: Option<FaceMatch> = None;

    for face in gallery {
        let distance = probe.euclidean_distance(&face.descriptor);
        if best.as_ref().is_none_or(|b| distance < b.distance) {
            best = Some(FaceMatch {
                user_id: face.user_id,
                distance,
            });
        }
    }

    best.filter(|b| b.distance < threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(fill: f32) -> FaceDescriptor {
        FaceDescriptor::new(vec![fill; DESCRIPTOR_LEN]).unwrap()
    }

    fn with_first(first: f32) -> FaceDescriptor {
        let mut v = vec![0.0; DESCRIPTOR_LEN];
        v[0] = first;
        FaceDescriptor::new(v).unwrap()
    }

    #[test]
    fn rejects_wrong_length_and_nan() {
        assert!(FaceDescriptor::new(vec![0.0; 127]).is_err());
        assert!(FaceDescriptor::new(vec![0.0; 129]).is_err());
        let mut v = vec![0.0; DESCRIPTOR_LEN];
        v[5] = f32::NAN;
        assert!(FaceDescriptor::new(v).is_err());
    }

    #[test]
    fn distance_to_self_is_zero() {
        let d = descriptor(0.25);
        assert_eq!(d.euclidean_distance(&d), 0.0);
    }

    #[test]
    fn distance_along_one_axis() {
        assert!((with_first(0.0).euclidean_distance(&with_first(0.3)) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn picks_the_closest_face_even_when_last() {
        let probe = with_first(0.0);
        let gallery = vec![
            EnrolledFace { user_id: 1, descriptor: with_first(0.55) },
            EnrolledFace { user_id: 2, descriptor: with_first(0.40) },
            EnrolledFace { user_id: 3, descriptor: with_first(0.10) },
        ];
        let m = best_match(&probe, &gallery, DEFAULT_MATCH_THRESHOLD).unwrap();
        assert_eq!(m.user_id, 3);
        assert!((m.distance - 0.10).abs() < 1e-6);
    }

    #[test]
    fn nothing_under_threshold_is_no_match() {
        let probe = with_first(0.0);
        let gallery = vec![EnrolledFace { user_id: 1, descriptor: with_first(0.75) }];
        assert!(best_match(&probe, &gallery, DEFAULT_MATCH_THRESHOLD).is_none());
        assert!(best_match(&probe, &gallery, 0.5).is_none());
        assert!(best_match(&probe, &gallery, 0.8).is_some());
    }

    #[test]
    fn empty_gallery_is_no_match() {
        assert!(best_match(&descriptor(0.1), &[], DEFAULT_MATCH_THRESHOLD).is_none());
    }

    #[test]
    fn json_storage_round_trip_keeps_length_check() {
        let d = descriptor(0.5);
        assert_eq!(FaceDescriptor::from_json(&d.to_json()).unwrap(), d);
        assert!(FaceDescriptor::from_json("[1.0, 2.0]").is_err());
    }
}
