use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::availability::date_range;

/// How long an approved booking may sit unpaid before it fails.
pub fn approval_window() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingHostApproval,
    PaymentPending,
    Confirmed,
    Failed,
    Rejected,
    CancelledByGuest,
    CancelledByHost,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingHostApproval => "pending_host_approval",
            BookingStatus::PaymentPending => "payment_pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Failed => "failed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::CancelledByGuest => "cancelled_by_guest",
            BookingStatus::CancelledByHost => "cancelled_by_host",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Failed
                | BookingStatus::Rejected
                | BookingStatus::Completed
                | BookingStatus::CancelledByGuest
                | BookingStatus::CancelledByHost
        )
    }

    /// States in which the booking owns claimed availability rows.
    pub fn holds_dates(&self) -> bool {
        matches!(
            self,
            BookingStatus::PaymentPending | BookingStatus::Confirmed
        )
    }

    /// States a cancellation is permitted from.
    pub const CANCELLABLE: [BookingStatus; 3] = [
        BookingStatus::PendingHostApproval,
        BookingStatus::PaymentPending,
        BookingStatus::Confirmed,
    ];
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_host_approval" => Ok(BookingStatus::PendingHostApproval),
            "payment_pending" => Ok(BookingStatus::PaymentPending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "failed" => Ok(BookingStatus::Failed),
            "rejected" => Ok(BookingStatus::Rejected),
            "cancelled_by_guest" => Ok(BookingStatus::CancelledByGuest),
            "cancelled_by_host" => Ok(BookingStatus::CancelledByHost),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// The central entity. Tenant-scoped, never deleted; every mutation after
/// creation goes through a status-guarded transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub tenant_id: String,
    pub listing_id: Uuid,
    pub guest_id: String,
    pub host_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i32,
    pub total_amount: Decimal,
    pub platform_fee: Decimal,
    pub cleaning_fee: Decimal,
    pub currency: String,
    pub status: BookingStatus,
    pub cancellation_policy: String,
    pub message: Option<String>,
    pub checkout_session_id: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// The contiguous dates the booking occupies: check-in inclusive,
    /// check-out exclusive.
    pub fn stay_dates(&self) -> Vec<NaiveDate> {
        date_range(self.check_in, self.check_out)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::PaymentPending
            && self.expires_at.is_some_and(|at| at < now)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub listing_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i32,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmBookingRequest {
    pub payment_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetCheckoutRequest {
    pub checkout_session_id: String,
}
