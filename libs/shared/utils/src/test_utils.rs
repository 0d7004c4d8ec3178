use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub payment_checkout_url: String,
    pub payment_merchant_id: String,
    pub payment_merchant_secret: String,
    pub booking_fee: f64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            payment_checkout_url: "https://pay.example.test/checkout".to_string(),
            payment_merchant_id: "TEST_MERCHANT".to_string(),
            payment_merchant_secret: "test-merchant-secret".to_string(),
            booking_fee: 350.0,
        }
    }
}

impl TestConfig {
    /// Config wired to a wiremock server standing in for the REST store.
    pub fn with_store_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            payment_checkout_url: self.payment_checkout_url.clone(),
            payment_merchant_id: self.payment_merchant_id.clone(),
            payment_merchant_secret: self.payment_merchant_secret.clone(),
            payment_currency: "LKR".to_string(),
            booking_fee: self.booking_fee,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub branch_id: Option<Uuid>,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
            branch_id: None,
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            branch_id: None,
        }
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn doctor(email: &str, branch_id: Uuid) -> Self {
        Self {
            branch_id: Some(branch_id),
            ..Self::new(email, "doctor")
        }
    }

    pub fn branch_staff(email: &str, branch_id: Uuid) -> Self {
        Self {
            branch_id: Some(branch_id),
            ..Self::new(email, "branch_staff")
        }
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            branch_id: self.branch_id,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "branch_id": user.branch_id,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST rows for wiremock-backed service tests.
pub struct MockStoreResponses;

impl MockStoreResponses {
    pub fn schedule_definition_row(
        id: Uuid,
        doctor_id: Uuid,
        branch_id: Uuid,
        weekday: i32,
        start_time: &str,
        end_time: &str,
        slot_duration_minutes: i32,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "doctor_id": doctor_id,
            "branch_id": branch_id,
            "weekday": weekday,
            "start_time": start_time,
            "end_time": end_time,
            "slot_duration_minutes": slot_duration_minutes,
            "max_patients_per_slot_window": 1,
            "recurrence_type": "weekly",
            "valid_from": "2025-01-01",
            "valid_until": "2030-12-31",
            "status": "active",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn booking_row(
        id: Uuid,
        doctor_id: Uuid,
        branch_id: Uuid,
        schedule_id: Uuid,
        patient_id: Uuid,
        date: &str,
        slot_number: i32,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "doctor_id": doctor_id,
            "branch_id": branch_id,
            "schedule_id": schedule_id,
            "date": date,
            "slot_number": slot_number,
            "patient_id": patient_id,
            "token_number": slot_number,
            "status": status,
            "payment_method": "cash",
            "booking_fee": 350.0,
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn cancellation_request_row(
        id: Uuid,
        doctor_id: Uuid,
        schedule_id: Uuid,
        cancel_date: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "doctor_id": doctor_id,
            "schedule_id": schedule_id,
            "cancel_date": cancel_date,
            "cancel_end_date": null,
            "reason": "personal leave",
            "status": status,
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn reschedule_attempt_row(
        appointment_id: Uuid,
        attempts_used: i32,
        max_attempts: i32,
        is_admin_cancelled_origin: bool,
    ) -> serde_json::Value {
        json!({
            "appointment_id": appointment_id,
            "attempts_used": attempts_used,
            "max_attempts": max_attempts,
            "is_admin_cancelled_origin": is_admin_cancelled_origin
        })
    }
}
