use std::fs;
use std::io::Cursor;
use std::sync::Arc;

use actix_web::{http::StatusCode, test, web, App};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use ndarray::ArrayView4;
use serde_json::Value;
use tempfile::TempDir;

use issue_classifier::{configure, AppState, Classifier, ModelError, PredictionLog};

const BOUNDARY: &str = "----issue-classifier-boundary";

/// Scores an image by its mean channel values so different colors map to
/// different classes, deterministically.
struct ColorMeanModel;

impl Classifier for ColorMeanModel {
    fn scores(&self, input: ArrayView4<f32>) -> Result<Vec<f32>, ModelError> {
        assert_eq!(input.shape(), &[1, 222, 222, 3]);
        let mut sums = [0.0f32; 3];
        for ((_, _, _, c), v) in input.indexed_iter() {
            sums[c] += *v;
        }
        let total: f32 = sums.iter().sum::<f32>().max(f32::EPSILON);
        // A fourth position the service must ignore.
        Ok(vec![sums[0] / total, sums[1] / total, sums[2] / total, 5.0])
    }
}

struct EmptyModel;

impl Classifier for EmptyModel {
    fn scores(&self, _: ArrayView4<f32>) -> Result<Vec<f32>, ModelError> {
        Ok(Vec::new())
    }
}

fn jpeg(color: [u8; 3]) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 240, Rgb(color)));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageOutputFormat::Jpeg(90)).unwrap();
    buf.into_inner()
}

fn multipart_body(field: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload.jpg\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(field: &str, content_type: &str, data: &[u8]) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/predict")
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart_body(field, content_type, data))
}

fn state(classifier: Arc<dyn Classifier>, dir: &TempDir) -> web::Data<AppState> {
    web::Data::new(AppState::new(
        classifier,
        PredictionLog::new(dir.path().join("prediction.json")),
    ))
}

#[actix_rt::test]
async fn solid_color_jpeg_gets_a_known_label() {
    let dir = TempDir::new().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(state(Arc::new(ColorMeanModel), &dir))
            .configure(configure),
    )
    .await;

    let resp = test::call_service(&app, upload_request("file", "image/jpeg", &jpeg([20, 30, 220])).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["prediction"], "streetlight");
    let confidence = body["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    assert!(body.get("error").is_none());

    let saved: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("prediction.json")).unwrap()).unwrap();
    assert_eq!(saved["prediction"], "streetlight");
    assert_eq!(saved["confidence"], body["confidence"]);
}

#[actix_rt::test]
async fn non_image_upload_returns_error_body() {
    let dir = TempDir::new().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(state(Arc::new(ColorMeanModel), &dir))
            .configure(configure),
    )
    .await;

    let noise: Vec<u8> = (0u32..512).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
    let resp = test::call_service(
        &app,
        upload_request("file", "application/octet-stream", &noise).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
    assert!(body.get("prediction").is_none());
    assert!(!dir.path().join("prediction.json").exists());
}

#[actix_rt::test]
async fn identical_uploads_give_identical_predictions() {
    let dir = TempDir::new().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(state(Arc::new(ColorMeanModel), &dir))
            .configure(configure),
    )
    .await;
    let image = jpeg([200, 40, 40]);

    let first: Value = test::call_and_read_body_json(
        &app,
        upload_request("file", "image/jpeg", &image).to_request(),
    )
    .await;
    let second: Value = test::call_and_read_body_json(
        &app,
        upload_request("file", "image/jpeg", &image).to_request(),
    )
    .await;

    assert_eq!(first["prediction"], "garbage");
    assert_eq!(first, second);
}

#[actix_rt::test]
async fn empty_model_output_is_reported_not_raised() {
    let dir = TempDir::new().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(state(Arc::new(EmptyModel), &dir))
            .configure(configure),
    )
    .await;

    let resp = test::call_service(&app, upload_request("file", "image/jpeg", &jpeg([1, 2, 3])).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body["error"],
        "Model returned empty predictions. Check input image and preprocessing."
    );
}

#[actix_rt::test]
async fn unwritable_prediction_file_is_a_request_error() {
    let dir = TempDir::new().unwrap();
    let state = web::Data::new(AppState::new(
        Arc::new(ColorMeanModel),
        PredictionLog::new(dir.path().join("no-such-dir").join("prediction.json")),
    ));
    let app = test::init_service(App::new().app_data(state).configure(configure)).await;

    let resp = test::call_service(&app, upload_request("file", "image/jpeg", &jpeg([9, 9, 9])).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("prediction.json"));
}

#[actix_rt::test]
async fn missing_file_field_is_rejected() {
    let dir = TempDir::new().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(state(Arc::new(ColorMeanModel), &dir))
            .configure(configure),
    )
    .await;

    let resp = test::call_service(&app, upload_request("photo", "image/jpeg", &jpeg([5, 5, 5])).to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

#[actix_rt::test]
async fn health_reports_ok() {
    let dir = TempDir::new().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(state(Arc::new(EmptyModel), &dir))
            .configure(configure),
    )
    .await;

    let body: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(body["status"], "ok");
}
