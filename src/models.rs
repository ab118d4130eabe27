use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserReq {
    #[schema(example = "rahim")]
    pub username: String,
    pub password: String,
}

/// Employee record a login acts for; `null` removes the link.
#[derive(Deserialize, ToSchema)]
pub struct LinkEmployeeReq {
    #[schema(example = 1, nullable = true)]
    pub employee_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "admin")]
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_cannot_claim_an_employee() {
        let body = r#"{"username":"x","password":"p","employee_id":7}"#;
        assert!(serde_json::from_str::<UserReq>(body).is_err());

        let body = r#"{"username":"x","password":"p"}"#;
        let user: UserReq = serde_json::from_str(body).unwrap();
        assert_eq!(user.username, "x");
    }

    #[test]
    fn link_accepts_null_to_unlink() {
        let link: LinkEmployeeReq = serde_json::from_str(r#"{"employee_id":null}"#).unwrap();
        assert_eq!(link.employee_id, None);
        let link: LinkEmployeeReq = serde_json::from_str(r#"{"employee_id":12}"#).unwrap();
        assert_eq!(link.employee_id, Some(12));
    }
}
