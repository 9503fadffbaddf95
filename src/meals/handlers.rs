use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderName, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use super::dto::{AnalyzeBase64Request, CreateMealRequest, MealDetails, MealSummary, Pagination};
use super::services::{analyze_and_record, remove_meal, save_meal, SaveMealError};
use crate::analysis::AnalysisResult;
use crate::auth::AuthUser;
use crate::error::AnalysisError;
use crate::images::services::{decode_base64_image, presign_photo};
use crate::state::AppState;

pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

type ApiError = (StatusCode, String);

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals))
        .route("/meals/:id", get(get_meal).delete(delete_meal))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze_multipart))
        .route("/analyze/base64", post(analyze_base64))
        .route("/meals", post(create_meal))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

// --- handlers ---

/// POST /analyze (multipart, field `image`)
#[instrument(skip(state, mp))]
pub async fn analyze_multipart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<Json<AnalysisResult>, ApiError> {
    let mut image: Option<Bytes> = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| (e.status(), e.body_text()))?
    {
        if field.name() == Some("image") {
            image = Some(field.bytes().await.map_err(|e| (e.status(), e.body_text()))?);
            break;
        }
    }

    let image = image
        .filter(|b| !b.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "image is required".to_string()))?;

    let result = analyze_and_record(&state, user_id, image)
        .await
        .map_err(analysis_failed)?;
    Ok(Json(result))
}

/// POST /analyze/base64 { "imageBase64": "..." }
#[instrument(skip(state, body))]
pub async fn analyze_base64(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<AnalyzeBase64Request>,
) -> Result<Json<AnalysisResult>, ApiError> {
    if body.image_base64.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "imageBase64 is required".into()));
    }
    let image = decode_base64_image(&body.image_base64)
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid base64".to_string()))?;

    let result = analyze_and_record(&state, user_id, image)
        .await
        .map_err(analysis_failed)?;
    Ok(Json(result))
}

/// POST /meals { title?, mealTime?, imageBase64?, analysis }
#[instrument(skip(state, body))]
pub async fn create_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreateMealRequest>,
) -> Result<(StatusCode, [(HeaderName, String); 1], Json<MealSummary>), ApiError> {
    let row = save_meal(&state, user_id, body).await.map_err(|e| match e {
        SaveMealError::InvalidAnalysis | SaveMealError::InvalidBase64(_) => {
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        SaveMealError::Image(inner) => analysis_failed(inner),
        SaveMealError::Persist(inner) => {
            error!(error = %inner, %user_id, "save meal failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "could not save meal".into())
        }
    })?;

    let location = format!("/api/v1/meals/{}", row.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(MealSummary::from(row)),
    ))
}

#[instrument(skip(state))]
pub async fn list_meals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<MealSummary>>, ApiError> {
    let (limit, offset) = p.clamped();
    let meals = state
        .store
        .list_meals(user_id, limit, offset)
        .await
        .map_err(internal)?;
    Ok(Json(meals.into_iter().map(MealSummary::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MealDetails>, ApiError> {
    let (meal, items) = state
        .store
        .get_meal(user_id, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Meal not found".to_string()))?;

    let image_url = presign_optional(&state, meal.image_ref.as_deref()).await;
    let thumbnail_url = presign_optional(&state, meal.thumbnail_ref.as_deref()).await;

    Ok(Json(MealDetails {
        meal: meal.into(),
        food_items: items.into_iter().map(Into::into).collect(),
        image_url,
        thumbnail_url,
    }))
}

#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if remove_meal(&state, user_id, id).await.map_err(internal)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Meal not found".into()))
    }
}

async fn presign_optional(state: &AppState, key: Option<&str>) -> Option<String> {
    let key = key?;
    match presign_photo(state.storage.as_ref(), key).await {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(error = %e, %key, "presign failed");
            None
        }
    }
}

fn analysis_failed(e: AnalysisError) -> ApiError {
    let status = match e {
        AnalysisError::ImageDecode(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AnalysisError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AnalysisError::AnalysisUnavailable(_) => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        error!(error = %e, "food analysis failed");
    } else {
        warn!(error = %e, "food analysis rejected image");
    }
    (status, e.user_message().to_string())
}

fn internal(e: anyhow::Error) -> ApiError {
    error!(error = %e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use image::{DynamicImage, ImageFormat};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::app::build_app;
    use crate::auth::test_token;
    use crate::images::services::fake::MemoryStorage;
    use crate::meals::repo::memory::InMemoryMealStore;
    use crate::state::fake;

    const APPLE: &str = "```json\n{\"foodItems\":[{\"name\":\"Apple\",\"calories\":95,\"protein\":0.5,\"carbs\":25,\"fat\":0.3}],\"totalNutrition\":{\"calories\":95,\"protein\":0.5,\"carbs\":25,\"fat\":0.3}}\n```";

    struct Harness {
        store: Arc<InMemoryMealStore>,
        storage: Arc<MemoryStorage>,
        app: Router,
    }

    fn harness_with(store: InMemoryMealStore, storage: MemoryStorage, reply: Option<&str>) -> Harness {
        let store = Arc::new(store);
        let storage = Arc::new(storage);
        let app = build_app(fake::state(store.clone(), storage.clone(), reply));
        Harness { store, storage, app }
    }

    fn harness(reply: Option<&str>) -> Harness {
        harness_with(InMemoryMealStore::default(), MemoryStorage::default(), reply)
    }

    fn bearer(user: Uuid) -> String {
        format!("Bearer {}", test_token(&fake::config().auth, user, 3600))
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn json_request(method: &str, uri: &str, user: Uuid, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, bearer(user))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str, user: Uuid) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, bearer(user))
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, headers, body)
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let h = harness(Some(APPLE));
        let req = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
        let (status, _, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("ok".into()));
    }

    #[tokio::test]
    async fn analyze_requires_bearer_token() {
        let h = harness(Some(APPLE));
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/analyze/base64")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"imageBase64": "YWJj"}).to_string()))
            .unwrap();
        let (status, _, _) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn analyze_base64_returns_result_and_records_it() {
        let h = harness(Some(APPLE));
        let user = Uuid::new_v4();
        let body = json!({ "imageBase64": format!("data:image/png;base64,{}", STANDARD.encode(png(64, 48))) });

        let (status, _, body) = send(&h.app, json_request("POST", "/api/v1/analyze/base64", user, body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["foodItems"][0]["name"], "Apple");
        assert_eq!(body["totalNutrition"]["calories"], 95.0);
        assert_eq!(body["synthetic"], false);

        let analyses = h.store.analyses.lock().unwrap();
        assert_eq!(analyses.len(), 1);
        assert_eq!(analyses[0].0, user);
    }

    #[tokio::test]
    async fn analyze_multipart_image_field() {
        let h = harness(Some(APPLE));
        let boundary = "platesense-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"meal.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(&png(32, 32));
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/analyze")
            .header(header::AUTHORIZATION, bearer(Uuid::new_v4()))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();

        let (status, _, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["foodItems"][0]["name"], "Apple");
    }

    #[tokio::test]
    async fn analyze_multipart_without_image_is_bad_request() {
        let h = harness(Some(APPLE));
        let boundary = "b";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{boundary}--\r\n"
        );
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/analyze")
            .header(header::AUTHORIZATION, bearer(Uuid::new_v4()))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();

        let (status, _, _) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unparseable_completion_is_synthetic_not_an_error() {
        let h = harness(Some("Sorry, I can't tell what this is."));
        let body = json!({ "imageBase64": STANDARD.encode(png(16, 16)) });

        let (status, _, body) =
            send(&h.app, json_request("POST", "/api/v1/analyze/base64", Uuid::new_v4(), body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["synthetic"], true);
        assert_eq!(body["foodItems"][0]["name"], "Unknown Food Item");
        assert_eq!(body["totalNutrition"]["calories"], 200.0);
    }

    #[tokio::test]
    async fn analysis_error_statuses() {
        let user = Uuid::new_v4();

        let h = harness(None);
        let body = json!({ "imageBase64": STANDARD.encode(png(16, 16)) });
        let (status, _, _) = send(&h.app, json_request("POST", "/api/v1/analyze/base64", user, body)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let h = harness(Some(APPLE));
        let body = json!({ "imageBase64": STANDARD.encode(b"definitely not an image") });
        let (status, _, _) = send(&h.app, json_request("POST", "/api/v1/analyze/base64", user, body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let body = json!({ "imageBase64": "%%%" });
        let (status, _, _) = send(&h.app, json_request("POST", "/api/v1/analyze/base64", user, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = send(&h.app, json_request("POST", "/api/v1/analyze/base64", user, json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failed_analysis_log_does_not_fail_request() {
        let h = harness_with(InMemoryMealStore::failing(), MemoryStorage::default(), Some(APPLE));
        let body = json!({ "imageBase64": STANDARD.encode(png(16, 16)) });
        let (status, _, body) =
            send(&h.app, json_request("POST", "/api/v1/analyze/base64", Uuid::new_v4(), body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["foodItems"][0]["name"], "Apple");
    }

    fn apple_analysis() -> Value {
        json!({
            "foodItems": [{"name": "Apple", "calories": 95, "protein": 0.5, "carbs": 25, "fat": 0.3}],
            "totalNutrition": {"calories": 95, "protein": 0.5, "carbs": 25, "fat": 0.3},
            "synthetic": false
        })
    }

    #[tokio::test]
    async fn create_get_and_delete_meal_with_photo() {
        let h = harness(Some(APPLE));
        let user = Uuid::new_v4();
        let body = json!({
            "title": "Snack",
            "mealTime": "2024-05-01T12:30:00Z",
            "imageBase64": STANDARD.encode(png(1600, 800)),
            "analysis": apple_analysis(),
        });

        let (status, headers, created) = send(&h.app, json_request("POST", "/api/v1/meals", user, body)).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(headers[header::LOCATION], format!("/api/v1/meals/{id}"));
        assert_eq!(created["title"], "Snack");
        assert_eq!(created["totalCalories"], 95.0);
        assert_eq!(created["mealTime"], "2024-05-01T12:30:00Z");
        assert_eq!(h.storage.objects.lock().unwrap().len(), 2);

        let uri = format!("/api/v1/meals/{id}");
        let (status, _, details) = send(&h.app, empty_request("GET", &uri, user)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(details["foodItems"][0]["name"], "Apple");
        assert_eq!(details["foodItems"][0]["quantity"], 1);
        assert!(details["imageUrl"].as_str().unwrap().starts_with("https://fake.local/meals/"));
        assert!(details["thumbnailUrl"].as_str().unwrap().ends_with("-thumb.jpg"));

        let (status, _, _) = send(&h.app, empty_request("DELETE", &uri, user)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(h.storage.objects.lock().unwrap().is_empty());

        let (status, _, _) = send(&h.app, empty_request("DELETE", &uri, user)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = send(&h.app, empty_request("GET", &uri, user)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_meal_defaults_title_and_skips_storage() {
        let h = harness(Some(APPLE));
        let body = json!({ "analysis": apple_analysis() });
        let (status, _, created) =
            send(&h.app, json_request("POST", "/api/v1/meals", Uuid::new_v4(), body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["title"], "Lunch");
        assert!(created.get("imageRef").is_none());
        assert!(h.storage.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_meal_coerces_submitted_analysis() {
        let h = harness(Some(APPLE));
        let user = Uuid::new_v4();
        let body = json!({
            "analysis": {
                "foodItems": [{"name": "", "calories": -500, "protein": -1, "carbs": 10, "fat": 2}],
                "totalNutrition": {"calories": -500, "protein": -1, "carbs": 10, "fat": 2}
            }
        });

        let (status, _, created) = send(&h.app, json_request("POST", "/api/v1/meals", user, body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["totalCalories"], 0.0);
        assert_eq!(created["totalProtein"], 0.0);
        assert_eq!(created["totalCarbs"], 10.0);

        let uri = format!("/api/v1/meals/{}", created["id"].as_str().unwrap());
        let (_, _, details) = send(&h.app, empty_request("GET", &uri, user)).await;
        let item = &details["foodItems"][0];
        assert_eq!(item["name"], "Unknown Food Item");
        assert_eq!(item["calories"], 0.0);
        assert_eq!(item["protein"], 0.0);
        assert_eq!(item["fat"], 2.0);
    }

    #[tokio::test]
    async fn create_meal_rejects_non_object_analysis() {
        let h = harness(Some(APPLE));
        let body = json!({ "analysis": [1, 2, 3] });
        let (status, _, _) = send(&h.app, json_request("POST", "/api/v1/meals", Uuid::new_v4(), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_meal_rejects_bad_photo() {
        let h = harness(Some(APPLE));
        let user = Uuid::new_v4();

        let body = json!({ "imageBase64": "%%%", "analysis": apple_analysis() });
        let (status, _, _) = send(&h.app, json_request("POST", "/api/v1/meals", user, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = json!({ "imageBase64": STANDARD.encode(b"text"), "analysis": apple_analysis() });
        let (status, _, _) = send(&h.app, json_request("POST", "/api/v1/meals", user, body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn failed_save_cleans_up_photo() {
        let h = harness_with(InMemoryMealStore::failing(), MemoryStorage::default(), Some(APPLE));
        let body = json!({ "imageBase64": STANDARD.encode(png(32, 32)), "analysis": apple_analysis() });
        let (status, _, _) = send(&h.app, json_request("POST", "/api/v1/meals", Uuid::new_v4(), body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(h.storage.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn storage_outage_fails_save() {
        let storage = MemoryStorage {
            fail_puts: true,
            ..MemoryStorage::default()
        };
        let h = harness_with(InMemoryMealStore::default(), storage, Some(APPLE));
        let body = json!({ "imageBase64": STANDARD.encode(png(32, 32)), "analysis": apple_analysis() });
        let (status, _, _) = send(&h.app, json_request("POST", "/api/v1/meals", Uuid::new_v4(), body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn list_is_per_user_and_paginated() {
        let h = harness(Some(APPLE));
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        for (i, title) in ["Breakfast", "Lunch", "Dinner"].iter().enumerate() {
            let body = json!({
                "title": title,
                "mealTime": format!("2024-05-0{}T12:00:00Z", i + 1),
                "analysis": apple_analysis(),
            });
            let (status, _, _) = send(&h.app, json_request("POST", "/api/v1/meals", alice, body)).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let body = json!({ "title": "Bob's", "analysis": apple_analysis() });
        send(&h.app, json_request("POST", "/api/v1/meals", bob, body)).await;

        let (status, _, list) = send(&h.app, empty_request("GET", "/api/v1/meals", alice)).await;
        assert_eq!(status, StatusCode::OK);
        let titles: Vec<&str> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Dinner", "Lunch", "Breakfast"]);

        let (_, _, page) = send(&h.app, empty_request("GET", "/api/v1/meals?limit=1&offset=1", alice)).await;
        assert_eq!(page.as_array().unwrap().len(), 1);
        assert_eq!(page[0]["title"], "Lunch");

        let (_, _, clamped) = send(&h.app, empty_request("GET", "/api/v1/meals?limit=0", alice)).await;
        assert_eq!(clamped.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn other_users_meal_is_not_found() {
        let h = harness(Some(APPLE));
        let owner = Uuid::new_v4();
        let body = json!({ "analysis": apple_analysis() });
        let (_, _, created) = send(&h.app, json_request("POST", "/api/v1/meals", owner, body)).await;
        let uri = format!("/api/v1/meals/{}", created["id"].as_str().unwrap());

        let stranger = Uuid::new_v4();
        let (status, _, _) = send(&h.app, empty_request("GET", &uri, stranger)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = send(&h.app, empty_request("DELETE", &uri, stranger)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
