use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub branch_id: Option<Uuid>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    /// Branch the user is attached to. Present for doctors and branch staff.
    pub branch_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from_claim(self.role.as_deref())
    }
}

/// Actor roles recognised by the booking subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    BranchStaff,
    Admin,
}

impl Role {
    pub fn from_claim(claim: Option<&str>) -> Self {
        match claim {
            Some("admin") => Role::Admin,
            Some("doctor") => Role::Doctor,
            Some("branch_staff") | Some("staff") => Role::BranchStaff,
            _ => Role::Patient,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::BranchStaff => "branch_staff",
            Role::Admin => "admin",
        }
    }

    /// Capability set for the role. Services consult this instead of
    /// comparing role strings at every call site.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Patient => &[
                Capability::BookOwn,
                Capability::CancelOwn,
                Capability::RescheduleOwn,
            ],
            Role::Doctor => &[
                Capability::ManageOwnSchedules,
                Capability::RequestScheduleCancellation,
                Capability::ViewBranchBookings,
            ],
            Role::BranchStaff => &[
                Capability::BookForAnyPatient,
                Capability::CancelWithinBranch,
                Capability::RescheduleWithinBranch,
                Capability::ViewBranchBookings,
            ],
            Role::Admin => &[
                Capability::BookForAnyPatient,
                Capability::CancelAny,
                Capability::RescheduleAny,
                Capability::ManageOwnSchedules,
                Capability::ApproveScheduleCancellation,
                Capability::ViewBranchBookings,
            ],
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Branch-initiated actors. A cancellation or reschedule performed by
    /// one of these grants the patient an elevated reschedule budget.
    pub fn is_branch_actor(&self) -> bool {
        matches!(self, Role::Doctor | Role::BranchStaff | Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    BookOwn,
    BookForAnyPatient,
    CancelOwn,
    CancelWithinBranch,
    CancelAny,
    RescheduleOwn,
    RescheduleWithinBranch,
    RescheduleAny,
    ManageOwnSchedules,
    RequestScheduleCancellation,
    ApproveScheduleCancellation,
    ViewBranchBookings,
}

/// Single authorization decision point for booking-side mutations.
pub struct AccessPolicy;

impl AccessPolicy {
    /// May `user` create a booking on behalf of `patient_id`?
    pub fn can_book_for(user: &User, patient_id: Uuid) -> bool {
        let role = user.role();
        if role.can(Capability::BookForAnyPatient) {
            return true;
        }
        role.can(Capability::BookOwn) && user.id == patient_id.to_string()
    }

    /// May `user` cancel a booking owned by `patient_id` at `branch_id`?
    pub fn can_cancel(user: &User, patient_id: Uuid, branch_id: Uuid) -> bool {
        let role = user.role();
        if role.can(Capability::CancelAny) {
            return true;
        }
        if role.can(Capability::CancelWithinBranch) {
            return user.branch_id == Some(branch_id);
        }
        role.can(Capability::CancelOwn) && user.id == patient_id.to_string()
    }

    /// May `user` reschedule a booking owned by `patient_id` at `branch_id`?
    pub fn can_reschedule(user: &User, patient_id: Uuid, branch_id: Uuid) -> bool {
        let role = user.role();
        if role.can(Capability::RescheduleAny) {
            return true;
        }
        if role.can(Capability::RescheduleWithinBranch) {
            return user.branch_id == Some(branch_id);
        }
        role.can(Capability::RescheduleOwn) && user.id == patient_id.to_string()
    }
}
