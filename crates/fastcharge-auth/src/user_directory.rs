use fastcharge_dataapi::{DataApiClient, DataApiError, DataApiIdentity};
use serde::Deserialize;
use serde_json::json;

const GET_USER_PK_BY_EMAIL_QUERY: &str =
    "query GetUserPKByEmail($email: Email!) { getUserByEmail(email: $email) { pk } }";

/// Resolves the backend primary key of a user.
pub trait UserDirectory: Send + Sync {
    fn user_pk_by_email(&self, email: &str, id_token: &str) -> Result<String, DataApiError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetUserByEmailData {
    get_user_by_email: UserNode,
}

#[derive(Deserialize)]
struct UserNode {
    pk: String,
}

#[derive(Debug, Clone)]
pub struct DataApiUserDirectory {
    client: DataApiClient,
}

impl DataApiUserDirectory {
    pub fn new(client: DataApiClient) -> Self {
        Self { client }
    }
}

impl UserDirectory for DataApiUserDirectory {
    fn user_pk_by_email(&self, email: &str, id_token: &str) -> Result<String, DataApiError> {
        let client = self.client.with_identity(DataApiIdentity {
            id_token: Some(id_token.to_string()),
            email: Some(email.to_string()),
            user_pk: None,
        });
        let data: GetUserByEmailData =
            client.execute(GET_USER_PK_BY_EMAIL_QUERY, &json!({ "email": email }))?;
        Ok(data.get_user_by_email.pk)
    }
}

#[cfg(test)]
mod tests {
    use fastcharge_dataapi::{DataApiClient, DataApiErrorKind};
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    use super::{DataApiUserDirectory, UserDirectory};

    #[test]
    fn functional_lookup_sends_caller_identity_and_returns_pk() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/")
                .header("authorization", "id-1")
                .header("x-user-email", "a@x.com")
                .body_includes("GetUserPKByEmail");
            then.status(200)
                .json_body(json!({"data": {"getUserByEmail": {"pk": "user_a"}}}));
        });

        let directory =
            DataApiUserDirectory::new(DataApiClient::new(server.url("/")).expect("client"));
        assert_eq!(
            directory.user_pk_by_email("a@x.com", "id-1").expect("lookup"),
            "user_a"
        );
        mock.assert();
    }

    #[test]
    fn functional_unknown_user_surfaces_not_found_kind() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/");
            then.status(200).json_body(json!({
                "errors": [{"message": "User not found", "extensions": {"code": "NOT_FOUND"}}]
            }));
        });

        let directory =
            DataApiUserDirectory::new(DataApiClient::new(server.url("/")).expect("client"));
        let error = directory
            .user_pk_by_email("a@x.com", "id-1")
            .expect_err("missing");
        assert_eq!(error.kind(), Some(&DataApiErrorKind::NotFound));
    }
}
