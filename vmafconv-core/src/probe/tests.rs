use super::*;

#[test]
fn parses_a_video_stream() {
  let json = r#"{
    "streams": [
      {
        "codec_name": "h264",
        "nb_frames": "600",
        "avg_frame_rate": "60/1",
        "bit_rate": "8000000"
      }
    ]
  }"#;

  let meta = parse_video_meta(json).unwrap();
  assert_eq!(600, meta.total_frames);
  assert_eq!(60, meta.fps);
  assert_eq!("h264", meta.codec_name);
}

#[test]
fn missing_video_stream_is_fatal() {
  assert!(parse_video_meta(r#"{"streams": []}"#).is_err());
  assert!(parse_video_meta(r#"{}"#).is_err());
}

#[test]
fn unparseable_frame_rate_is_fatal() {
  let json = r#"{
    "streams": [
      {"codec_name": "h264", "nb_frames": "600", "avg_frame_rate": "0/0"}
    ]
  }"#;
  assert!(parse_video_meta(json).is_err());
}

#[test]
fn missing_frame_count_is_fatal() {
  let json = r#"{
    "streams": [
      {"codec_name": "h264", "avg_frame_rate": "60/1"}
    ]
  }"#;
  assert!(parse_video_meta(json).is_err());
}

#[test]
fn ntsc_rates_round_to_integer_fps() {
  assert_eq!(Some(30), parse_frame_rate("30000/1001"));
  assert_eq!(Some(24), parse_frame_rate("24000/1001"));
  assert_eq!(Some(60), parse_frame_rate("60/1"));
  assert_eq!(None, parse_frame_rate("0/0"));
  assert_eq!(None, parse_frame_rate("0/1"));
  assert_eq!(None, parse_frame_rate("garbage"));
}

#[test]
fn audio_stream_with_bitrate() {
  let json = r#"{
    "streams": [
      {"codec_name": "aac", "bit_rate": "192000"}
    ]
  }"#;

  let meta = parse_audio_meta(json);
  assert!(meta.present);
  assert_eq!(Some("aac".to_owned()), meta.codec_name);
  assert_eq!(Some(192_000), meta.bitrate);
}

#[test]
fn missing_audio_stream_is_not_an_error() {
  let meta = parse_audio_meta(r#"{"streams": []}"#);
  assert!(!meta.present);
  assert_eq!(None, meta.codec_name);
  assert_eq!(None, meta.bitrate);
}

#[test]
fn keyframe_packets_are_filtered_by_flag() {
  let json = r#"{
    "packets": [
      {"pts_time": "0.000000", "flags": "K__"},
      {"pts_time": "0.016667", "flags": "___"},
      {"pts_time": "2.000000", "flags": "K__"},
      {"pts_time": "5.000000", "flags": "K_"},
      {"pts_time": "6.000000", "flags": "__"}
    ]
  }"#;

  let pts = parse_keyframe_pts(json).unwrap();
  assert_eq!(vec![0.0, 2.0, 5.0], pts);
}
