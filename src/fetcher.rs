use crate::{
    backend::{ApiBackend, ApiRequest},
    client::ApiClient,
    error::ApiError,
    response::decode,
    session::SessionToken,
};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

impl<B: ApiBackend> ApiClient<B> {
    /// Authenticated GET shared by every read. Failures carry the raw response text.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: Url,
        token: &SessionToken,
    ) -> Result<T, ApiError> {
        let raw = self.backend().send(ApiRequest::get(url).bearer(token)).await?;
        if !raw.is_success() {
            debug!(status = raw.status, "Authenticated fetch failed");
        }
        decode(raw)?.into_raw_result()
    }
}

#[cfg(test)]
mod test {
    use crate::backend::Method;
    use crate::error::ApiError;
    use crate::session::SessionToken;
    use crate::testutils::{json_response, mock_client, text_response};
    use crate::types::Occupancy;
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_attaches_token() {
        let (client, backend) = mock_client();
        backend.respond("/occupancy", json_response(200, json!({"occupied": 1, "total": 4})));

        let token = SessionToken::new("abc");
        let occupancy: Occupancy = client
            .fetch_json(client.endpoint("/occupancy"), &token)
            .await
            .unwrap();

        assert_eq!(occupancy, Occupancy { occupied: 1, total: 4 });
        let request = backend.last_request();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.token, Some(token));
        assert!(request.body.is_none());
    }

    #[test_case::test_case(json_response(401, json!({"detail": "Invalid or expired token"})), r#"{"detail":"Invalid or expired token"}"# ; "json error")]
    #[test_case::test_case(text_response(503, "upstream down"), "upstream down" ; "text error")]
    #[tokio::test]
    async fn test_fetch_error_carries_raw_text(response: crate::response::RawResponse, expected: &str) {
        let (client, backend) = mock_client();
        let status = response.status;
        backend.respond("/lots", response);

        let err = client
            .fetch_json::<serde_json::Value>(client.endpoint("/lots"), &SessionToken::new("abc"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ApiError::Http {
                status,
                message: expected.into()
            }
        );
    }
}
