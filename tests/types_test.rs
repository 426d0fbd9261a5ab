#[cfg(test)]
mod types_tests {
    use crabintrinsics::testing::{sample_distortion, sample_intrinsics};
    use crabintrinsics::types::{AcquisitionOutcome, CalibrationResult, Platform, TrackingState};
    use crabintrinsics::AcquisitionError;

    #[test]
    fn test_only_tracking_is_confirmed() {
        assert!(TrackingState::Tracking.is_tracking());
        assert!(!TrackingState::NotTracking.is_tracking());
        assert!(!TrackingState::Paused.is_tracking());
    }

    #[test]
    fn test_calibration_result_json_shape() {
        let result = CalibrationResult::assemble(sample_intrinsics(), Some(sample_distortion()));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["focalLength"][0], 1000.0);
        assert_eq!(json["focalLength"][1], 1005.0);
        assert_eq!(json["principalPoint"][0], 640.0);
        assert_eq!(json["imageDimensions"][0], 1280);
        assert_eq!(json["imageDimensions"][1], 720);
        assert_eq!(json["distortion"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_calibration_result_accepts_long_distortion_key() {
        let json = r#"{
            "focalLength": [1000.0, 1005.0],
            "principalPoint": [640.0, 360.0],
            "imageDimensions": [1280, 720],
            "distortionCoefficients": []
        }"#;
        let result: CalibrationResult = serde_json::from_str(json).unwrap();
        assert!(!result.has_distortion());
        assert_eq!(result.image_dimensions, (1280, 720));
    }

    #[test]
    fn test_outcome_result_conversion() {
        let outcome: AcquisitionOutcome = Err(AcquisitionError::already_in_progress()).into();
        assert!(!outcome.is_success());

        let calibration = CalibrationResult::assemble(sample_intrinsics(), None);
        let outcome = AcquisitionOutcome::Success(calibration.clone());
        assert_eq!(outcome.into_result().unwrap(), calibration);
    }

    #[test]
    fn test_platform_tracking_support() {
        assert!(Platform::Ios.has_ar_tracking());
        assert!(Platform::Android.has_ar_tracking());
        assert!(!Platform::Linux.has_ar_tracking());
        assert_eq!(Platform::Ios.as_str(), "ios");
    }
}
