//! `Json` and `Query` wrappers whose rejections render through `AppError`,
//! so malformed input gets the same `{status, message}` body as every other
//! error.

use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::errors::AppError;

pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection)  => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}

pub struct AppQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection)   => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request as HttpRequest};
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
    }

    fn json_request(body: &'static str) -> Request {
        HttpRequest::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn well_formed_json_is_extracted() {
        let AppJson(sample) = AppJson::<Sample>::from_request(json_request(r#"{"name":"run"}"#), &())
            .await
            .unwrap();
        assert_eq!(sample.name, "run");
    }

    #[tokio::test]
    async fn broken_json_is_bad_request() {
        for body in ["{not json", r#"{"other":1}"#] {
            let result = AppJson::<Sample>::from_request(json_request(body), &()).await;
            assert!(matches!(result, Err(AppError::BadRequest(_))), "{body}");
        }
    }

    #[tokio::test]
    async fn bad_query_is_bad_request() {
        #[derive(Debug, Deserialize)]
        struct Flag {
            #[allow(dead_code)]
            completed: bool,
        }

        let (mut parts, _) = HttpRequest::builder()
            .uri("/?completed=maybe")
            .body(())
            .unwrap()
            .into_parts();
        let result = AppQuery::<Flag>::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
