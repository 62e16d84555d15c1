use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, BookingResult};
use crate::utils::{serialize_object_id, serialize_object_ids};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub bookings: Vec<ObjectId>,
}

/// Public view of a user; never carries the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[serde(rename = "_id", serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub name: String,
    pub email: String,
    #[serde(serialize_with = "serialize_object_ids")]
    pub bookings: Vec<ObjectId>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            name: user.name,
            email: user.email,
            bookings: user.bookings,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl SignupRequest {
    pub fn validate(&self) -> BookingResult<()> {
        if self.name.trim().is_empty() {
            return Err(BookingError::InvalidArgument("name is required".to_string()));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(BookingError::InvalidArgument("a valid email is required".to_string()));
        }
        if self.password.len() < 6 {
            return Err(BookingError::InvalidArgument(
                "password must be at least 6 characters".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_response_hides_password() {
        let user = User {
            id: ObjectId::new(),
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            password: "$argon2id$secret".to_string(),
            bookings: vec![],
        };
        let json = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["email"], "asha@example.com");
    }

    #[test]
    fn signup_validation() {
        let ok = SignupRequest {
            name: "Asha".into(),
            email: "asha@example.com".into(),
            password: "hunter22".into(),
        };
        assert!(ok.validate().is_ok());

        let bad_email = SignupRequest {
            email: "asha".into(),
            ..ok
        };
        assert!(bad_email.validate().is_err());
    }
}
