//! CultPass tools: users, subscriptions, experiences and reservations
//!
//! Every mutation runs inside a single [`FileStore::update`], so a rule check
//! and the change it guards see the same data.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use udahub_agent::{Tool, ToolAnnotations, ToolMetadata, ToolResult};
use udahub_graph::storage::StorageResult;

use super::{refusal, required_str};
use crate::store::{CustomerDirectory, CustomerUser, Experience, FileStore, Reservation};

const AUTHOR: &str = "cultpass";

type Rule<T> = std::result::Result<T, String>;

fn outcome(result: StorageResult<Rule<Value>>) -> ToolResult {
    match result {
        Ok(Ok(value)) => ToolResult::json(&value),
        Ok(Err(message)) => refusal(message),
        Err(e) => ToolResult::error(format!("CultPass storage failed: {}", e)),
    }
}

fn user_json(user: &CustomerUser) -> Value {
    let s = &user.subscription;
    json!({
        "user_id": user.user_id,
        "full_name": user.full_name,
        "email": user.email,
        "is_blocked": user.is_blocked,
        "subscription": {
            "status": s.status,
            "tier": s.tier,
            "monthly_quota": s.monthly_quota,
            "started_at": s.started_at.to_rfc3339(),
            "ended_at": s.ended_at.map(|t| t.to_rfc3339()),
        }
    })
}

fn experience_json(e: &Experience) -> Value {
    json!({
        "experience_id": e.experience_id,
        "title": e.title,
        "description": e.description,
        "location": e.location,
        "when": e.when.to_rfc3339(),
        "slots_available": e.slots_available,
        "is_premium": e.is_premium,
    })
}

fn reservation_json(r: &Reservation, experience: Option<&Experience>) -> Value {
    json!({
        "reservation_id": r.reservation_id,
        "experience_id": r.experience_id,
        "date": r.date,
        "time": r.time,
        "party_size": r.party_size,
        "status": r.status,
        "created_at": r.created_at.to_rfc3339(),
        "experience": experience.map(experience_json),
    })
}

fn user_mut<'a>(d: &'a mut CustomerDirectory, user_id: &str) -> Rule<&'a mut CustomerUser> {
    d.users
        .iter_mut()
        .find(|u| u.user_id == user_id)
        .ok_or_else(|| format!("No Cultpass user found for user_id {}", user_id))
}

fn user_id_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "user_id": { "type": "string", "description": "The user's CultPass user_id" }
        },
        "required": ["user_id"]
    })
}

fn user_id_arg(arguments: &Value) -> Result<&str, ToolResult> {
    required_str(arguments, "user_id")
}

/// Get a CultPass user with their subscription
pub struct GetUserTool {
    store: Arc<FileStore>,
}

impl GetUserTool {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetUserTool {
    fn name(&self) -> &str {
        "get_cultpass_user"
    }

    fn description(&self) -> &str {
        "Get a CultPass user by user_id, including whether they are blocked and their subscription."
    }

    fn parameters_schema(&self) -> Value {
        user_id_schema()
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            AUTHOR,
            &["cultpass", "user", "details", "subscription", "validation"],
            ToolAnnotations::read_only(),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        let user_id = match user_id_arg(&arguments) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let found = self.store.read(|d| {
            d.cultpass
                .users
                .iter()
                .find(|u| u.user_id == user_id)
                .map(user_json)
        });
        match found {
            Some(user) => ToolResult::json(&user),
            None => refusal(format!("No Cultpass user found for user_id {}", user_id)),
        }
    }
}

/// Subscription changes a user can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriptionChange {
    Cancel,
    Reactivate,
    Upgrade,
}

impl SubscriptionChange {
    fn apply(self, d: &mut CustomerDirectory, user_id: &str) -> Rule<Value> {
        let user = user_mut(d, user_id)?;
        let sub = &mut user.subscription;
        match self {
            SubscriptionChange::Cancel => {
                if sub.status != "active" {
                    return Err(format!(
                        "Subscription cannot be cancelled because it is {}.",
                        sub.status
                    ));
                }
                sub.status = "cancelled".to_string();
                sub.ended_at = Some(Utc::now());
            }
            SubscriptionChange::Reactivate => {
                if sub.status != "cancelled" {
                    return Err(format!(
                        "Only cancelled subscriptions can be reactivated; this one is {}.",
                        sub.status
                    ));
                }
                sub.status = "active".to_string();
                sub.started_at = Utc::now();
                sub.ended_at = None;
            }
            SubscriptionChange::Upgrade => {
                if sub.status != "active" {
                    return Err("Only active subscriptions can be upgraded.".to_string());
                }
                if sub.tier == "premium" {
                    return Err("Subscription is already premium.".to_string());
                }
                sub.tier = "premium".to_string();
            }
        }
        Ok(user_json(user))
    }
}

/// A mutating subscription tool
struct SubscriptionTool {
    store: Arc<FileStore>,
    change: SubscriptionChange,
}

impl SubscriptionTool {
    async fn run(&self, arguments: &Value) -> ToolResult {
        let user_id = match user_id_arg(arguments) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let result = outcome(self.store.update(|d| self.change.apply(&mut d.cultpass, user_id)));
        if !result.is_error {
            tracing::info!(user_id, change = ?self.change, "subscription tool ran");
        }
        result
    }
}

pub struct CancelSubscriptionTool(SubscriptionTool);

impl CancelSubscriptionTool {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self(SubscriptionTool {
            store,
            change: SubscriptionChange::Cancel,
        })
    }
}

#[async_trait]
impl Tool for CancelSubscriptionTool {
    fn name(&self) -> &str {
        "cancel_cultpass_subscription"
    }

    fn description(&self) -> &str {
        "Cancel the active CultPass subscription of a user."
    }

    fn parameters_schema(&self) -> Value {
        user_id_schema()
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            AUTHOR,
            &["cultpass", "subscription", "cancel"],
            ToolAnnotations::mutating(true, true),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        self.0.run(&arguments).await
    }
}

pub struct ReactivateSubscriptionTool(SubscriptionTool);

impl ReactivateSubscriptionTool {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self(SubscriptionTool {
            store,
            change: SubscriptionChange::Reactivate,
        })
    }
}

#[async_trait]
impl Tool for ReactivateSubscriptionTool {
    fn name(&self) -> &str {
        "reactivate_cultpass_subscription"
    }

    fn description(&self) -> &str {
        "Reactivate a cancelled CultPass subscription."
    }

    fn parameters_schema(&self) -> Value {
        user_id_schema()
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            AUTHOR,
            &["cultpass", "subscription", "reactivate"],
            ToolAnnotations::mutating(false, true),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        self.0.run(&arguments).await
    }
}

pub struct UpgradeSubscriptionTool(SubscriptionTool);

impl UpgradeSubscriptionTool {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self(SubscriptionTool {
            store,
            change: SubscriptionChange::Upgrade,
        })
    }
}

#[async_trait]
impl Tool for UpgradeSubscriptionTool {
    fn name(&self) -> &str {
        "upgrade_cultpass_subscription"
    }

    fn description(&self) -> &str {
        "Upgrade an active basic CultPass subscription to the premium tier."
    }

    fn parameters_schema(&self) -> Value {
        user_id_schema()
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            AUTHOR,
            &["cultpass", "subscription", "upgrade"],
            ToolAnnotations::mutating(false, true),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        self.0.run(&arguments).await
    }
}

/// List a user's reservations
pub struct GetReservationsTool {
    store: Arc<FileStore>,
}

impl GetReservationsTool {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetReservationsTool {
    fn name(&self) -> &str {
        "get_cultpass_reservations"
    }

    fn description(&self) -> &str {
        "List the reservations of a CultPass user, with the experience each one is for."
    }

    fn parameters_schema(&self) -> Value {
        user_id_schema()
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            AUTHOR,
            &["cultpass", "reservation", "details"],
            ToolAnnotations::read_only(),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        let user_id = match user_id_arg(&arguments) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let reservations = self.store.read(|d| {
            let dir = &d.cultpass;
            if !dir.users.iter().any(|u| u.user_id == user_id) {
                return Err(format!("No Cultpass user found for user_id {}", user_id));
            }
            Ok(dir
                .reservations
                .iter()
                .filter(|r| r.user_id == user_id)
                .map(|r| {
                    let experience = dir
                        .experiences
                        .iter()
                        .find(|e| e.experience_id == r.experience_id);
                    reservation_json(r, experience)
                })
                .collect::<Vec<_>>())
        });
        match reservations {
            Ok(list) => ToolResult::json(&json!({ "reservations": list })),
            Err(message) => refusal(message),
        }
    }
}

fn cancel_reservation(d: &mut CustomerDirectory, user_id: &str, reservation_id: &str) -> Rule<Value> {
    let reservation = d
        .reservations
        .iter_mut()
        .find(|r| r.reservation_id == reservation_id && r.user_id == user_id)
        .ok_or_else(|| "Reservation not found.".to_string())?;
    if reservation.status == "cancelled" {
        return Err("Reservation is already cancelled.".to_string());
    }
    reservation.status = "cancelled".to_string();
    let reservation = reservation.clone();

    let experience = d
        .experiences
        .iter_mut()
        .find(|e| e.experience_id == reservation.experience_id);
    if let Some(experience) = experience {
        experience.slots_available += reservation.party_size;
        Ok(reservation_json(&reservation, Some(experience)))
    } else {
        Ok(reservation_json(&reservation, None))
    }
}

/// Cancel one of a user's reservations
pub struct CancelReservationTool {
    store: Arc<FileStore>,
}

impl CancelReservationTool {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CancelReservationTool {
    fn name(&self) -> &str {
        "cancel_cultpass_reservation"
    }

    fn description(&self) -> &str {
        "Cancel a reservation of a CultPass user and free its slots."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": { "type": "string" },
                "reservation_id": { "type": "string" }
            },
            "required": ["user_id", "reservation_id"]
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            AUTHOR,
            &["cultpass", "reservation", "cancel"],
            ToolAnnotations::mutating(true, true),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        let (user_id, reservation_id) = match (
            required_str(&arguments, "user_id"),
            required_str(&arguments, "reservation_id"),
        ) {
            (Ok(u), Ok(r)) => (u, r),
            (Err(e), _) | (_, Err(e)) => return e,
        };
        outcome(
            self.store
                .update(|d| cancel_reservation(&mut d.cultpass, user_id, reservation_id)),
        )
    }
}

struct Booking<'a> {
    user_id: &'a str,
    experience_id: &'a str,
    date: &'a str,
    time: &'a str,
    party_size: u32,
}

fn make_reservation(d: &mut CustomerDirectory, booking: &Booking<'_>) -> Rule<Value> {
    let user = d
        .users
        .iter()
        .find(|u| u.user_id == booking.user_id)
        .ok_or_else(|| format!("No Cultpass user found for user_id {}", booking.user_id))?;
    if user.is_blocked {
        return Err("User is blocked and cannot make reservations.".to_string());
    }
    if user.subscription.status != "active" {
        return Err("User has no active subscription.".to_string());
    }
    let premium_user = user.subscription.tier == "premium";

    if d.reservations.iter().any(|r| {
        r.user_id == booking.user_id
            && r.experience_id == booking.experience_id
            && r.status != "cancelled"
    }) {
        return Err("User already has a reservation for this experience.".to_string());
    }

    let experience = d
        .experiences
        .iter_mut()
        .find(|e| e.experience_id == booking.experience_id)
        .ok_or_else(|| "Experience not found.".to_string())?;
    if experience.slots_available < booking.party_size {
        return Err(format!(
            "Not enough slots available ({} left).",
            experience.slots_available
        ));
    }
    if experience.is_premium && !premium_user {
        return Err("This experience requires a premium subscription.".to_string());
    }
    experience.slots_available -= booking.party_size;
    let experience = experience.clone();

    let reservation = Reservation {
        reservation_id: uuid::Uuid::new_v4().to_string(),
        user_id: booking.user_id.to_string(),
        experience_id: booking.experience_id.to_string(),
        date: booking.date.to_string(),
        time: booking.time.to_string(),
        party_size: booking.party_size,
        status: "reserved".to_string(),
        created_at: Utc::now(),
    };
    let value = reservation_json(&reservation, Some(&experience));
    d.reservations.push(reservation);
    Ok(value)
}

/// Reserve an experience for a user
pub struct MakeReservationTool {
    store: Arc<FileStore>,
}

impl MakeReservationTool {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MakeReservationTool {
    fn name(&self) -> &str {
        "make_cultpass_reservation"
    }

    fn description(&self) -> &str {
        "Reserve an experience for a CultPass user. The user needs an active subscription, and premium experiences need the premium tier."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": { "type": "string" },
                "experience_id": { "type": "string" },
                "date": { "type": "string", "description": "Date of the visit, YYYY-MM-DD" },
                "time": { "type": "string", "description": "Time of the visit, HH:MM" },
                "party_size": { "type": "integer", "minimum": 1 }
            },
            "required": ["user_id", "experience_id", "date", "time", "party_size"]
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            AUTHOR,
            &["cultpass", "reservation", "create"],
            ToolAnnotations::mutating(false, false),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        let fields = (
            required_str(&arguments, "user_id"),
            required_str(&arguments, "experience_id"),
            required_str(&arguments, "date"),
            required_str(&arguments, "time"),
        );
        let booking = match fields {
            (Ok(user_id), Ok(experience_id), Ok(date), Ok(time)) => Booking {
                user_id,
                experience_id,
                date,
                time,
                party_size: arguments
                    .get("party_size")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(1)
                    .max(1) as u32,
            },
            (Err(e), ..) | (_, Err(e), ..) | (_, _, Err(e), _) | (.., Err(e)) => return e,
        };

        let result = outcome(self.store.update(|d| make_reservation(&mut d.cultpass, &booking)));
        if !result.is_error {
            tracing::info!(
                user_id = booking.user_id,
                experience_id = booking.experience_id,
                "reservation tool ran"
            );
        }
        result
    }
}

/// Details of one experience
pub struct GetExperienceTool {
    store: Arc<FileStore>,
}

impl GetExperienceTool {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetExperienceTool {
    fn name(&self) -> &str {
        "get_cultpass_experience"
    }

    fn description(&self) -> &str {
        "Get the details of a CultPass experience by experience_id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "experience_id": { "type": "string" }
            },
            "required": ["experience_id"]
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            AUTHOR,
            &["cultpass", "experience", "details", "browsing", "reservation"],
            ToolAnnotations::read_only(),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        let experience_id = match required_str(&arguments, "experience_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let found = self.store.read(|d| {
            d.cultpass
                .experiences
                .iter()
                .find(|e| e.experience_id == experience_id)
                .map(experience_json)
        });
        match found {
            Some(experience) => ToolResult::json(&experience),
            None => refusal(format!("No experience found for experience_id {}", experience_id)),
        }
    }
}

/// Browse the catalog, optionally by a keyword
pub struct ListExperiencesTool {
    store: Arc<FileStore>,
}

impl ListExperiencesTool {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListExperiencesTool {
    fn name(&self) -> &str {
        "list_cultpass_experiences"
    }

    fn description(&self) -> &str {
        "List CultPass experiences. An optional keyword filters by title, description or location."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keyword": { "type": "string" }
            }
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(
            AUTHOR,
            &["cultpass", "experience", "browsing", "reservation"],
            ToolAnnotations::read_only(),
        )
    }

    async fn execute(&self, _id: &str, arguments: Value, _cancel: CancellationToken) -> ToolResult {
        let keyword = arguments
            .get("keyword")
            .and_then(|v| v.as_str())
            .map(str::to_lowercase)
            .filter(|k| !k.is_empty());
        let list: Vec<Value> = self.store.read(|d| {
            d.cultpass
                .experiences
                .iter()
                .filter(|e| match &keyword {
                    Some(k) => format!("{} {} {}", e.title, e.description, e.location)
                        .to_lowercase()
                        .contains(k.as_str()),
                    None => true,
                })
                .map(experience_json)
                .collect()
        });
        ToolResult::json(&json!({ "experiences": list }))
    }
}
