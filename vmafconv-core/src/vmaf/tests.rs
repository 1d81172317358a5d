use super::*;

#[test]
fn reads_the_pooled_harmonic_mean() {
  let json = r#"{
    "version": "2.3.1",
    "frames": [
      {"frameNum": 0, "metrics": {"vmaf": 92.1}},
      {"frameNum": 1, "metrics": {"vmaf": 90.8}}
    ],
    "pooled_metrics": {
      "vmaf": {"min": 90.8, "max": 92.1, "mean": 91.45, "harmonic_mean": 91.42}
    }
  }"#;

  let score = read_harmonic_mean(json).unwrap();
  assert!((score - 91.42).abs() < f64::EPSILON);
}

#[test]
fn rejects_logs_without_pooled_metrics() {
  assert!(read_harmonic_mean(r#"{"frames": []}"#).is_err());
  assert!(read_harmonic_mean("not json").is_err());
}
