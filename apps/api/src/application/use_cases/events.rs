//! Shared calendar of a couple. One partner proposes, the other approves or cancels.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::principal::Principal,
    domain::entities::event_status::EventStatus,
};

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait EventRepo: Send + Sync {
    async fn create(&self, input: &NewEvent) -> AppResult<EventProfile>;

    /// Soft-deleted events included.
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<EventProfile>>;

    /// Live events of a couple, earliest first.
    async fn list_for_couple(&self, couple_id: Uuid) -> AppResult<Vec<EventProfile>>;

    /// Roll the couple's events dated before `now` over to PAST, cancelled ones excepted.
    async fn mark_past(&self, couple_id: Uuid, now: DateTime<Utc>) -> AppResult<u64>;

    /// Apply the fields that are set; `None` keeps the stored value.
    async fn update(&self, id: Uuid, changes: &EventChanges) -> AppResult<EventProfile>;

    async fn soft_delete(&self, id: Uuid) -> AppResult<EventProfile>;

    async fn delete(&self, id: Uuid) -> AppResult<()>;
}

// ============================================================================
// Profile Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct EventProfile {
    pub id: Uuid,
    pub couple_id: Uuid,
    pub created_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub status: EventStatus,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub id: Uuid,
    pub couple_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub status: Option<EventStatus>,
    pub approved_by: Option<Uuid>,
}

impl EventChanges {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.location.is_none()
            && self.lat.is_none()
            && self.lon.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct CreateEventInput {
    pub title: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateEventInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub status: Option<EventStatus>,
}

impl UpdateEventInput {
    fn has_details(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.date.is_some()
            || self.time.is_some()
            || self.location.is_some()
            || self.lat.is_some()
            || self.lon.is_some()
    }
}

fn validate_coordinates(lat: Option<f64>, lon: Option<f64>) -> AppResult<()> {
    if lat.is_some_and(|v| !(-90.0..=90.0).contains(&v)) {
        return Err(AppError::InvalidInput("Latitude must be between -90 and 90".into()));
    }
    if lon.is_some_and(|v| !(-180.0..=180.0).contains(&v)) {
        return Err(AppError::InvalidInput("Longitude must be between -180 and 180".into()));
    }
    Ok(())
}

fn non_empty_title(title: &str) -> AppResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::InvalidInput("Title is required".into()));
    }
    Ok(title.to_string())
}

/// Events and notes only exist inside a couple.
pub(crate) fn require_couple(principal: Principal) -> AppResult<Uuid> {
    principal.couple_id.ok_or_else(|| {
        AppError::InvalidInput("Connect with your partner first".into())
    })
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct EventUseCases {
    event_repo: Arc<dyn EventRepo>,
}

impl EventUseCases {
    pub fn new(event_repo: Arc<dyn EventRepo>) -> Self {
        Self { event_repo }
    }

    /// Propose an event. It starts PENDING until the partner answers.
    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        principal: Principal,
        input: CreateEventInput,
    ) -> AppResult<EventProfile> {
        let couple_id = require_couple(principal)?;
        let title = non_empty_title(&input.title)?;
        validate_coordinates(input.lat, input.lon)?;

        let event = self
            .event_repo
            .create(&NewEvent {
                id: Uuid::new_v4(),
                couple_id,
                created_by: principal.user_id,
                title,
                description: input.description,
                date: input.date,
                time: input.time,
                location: input.location,
                lat: input.lat,
                lon: input.lon,
            })
            .await?;

        info!(event_id = %event.id, %couple_id, "Event created");
        Ok(event)
    }

    /// The couple's calendar, after rolling dated-out events over to PAST.
    pub async fn list(&self, principal: Principal) -> AppResult<Vec<EventProfile>> {
        let couple_id = require_couple(principal)?;
        self.event_repo.mark_past(couple_id, Utc::now()).await?;
        self.event_repo.list_for_couple(couple_id).await
    }

    pub async fn get(&self, principal: Principal, id: Uuid) -> AppResult<EventProfile> {
        let event = self
            .event_repo
            .get_by_id(id)
            .await?
            .filter(|e| !e.is_deleted)
            .ok_or(AppError::NotFound)?;

        if principal.couple_id != Some(event.couple_id) {
            return Err(AppError::Forbidden);
        }
        Ok(event)
    }

    /// The creator edits details; the partner approves or cancels.
    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        principal: Principal,
        id: Uuid,
        input: UpdateEventInput,
    ) -> AppResult<EventProfile> {
        let event = self.get(principal, id).await?;
        let is_creator = event.created_by == principal.user_id;

        let mut changes = EventChanges::default();
        if is_creator {
            if input.has_details() {
                changes.title = input.title.as_deref().map(non_empty_title).transpose()?;
                validate_coordinates(input.lat, input.lon)?;
                changes.description = input.description.clone();
                changes.date = input.date;
                changes.time = input.time.clone();
                changes.location = input.location.clone();
                changes.lat = input.lat;
                changes.lon = input.lon;
            }
        } else if let Some(status) = input.status {
            if !status.is_partner_decision() {
                return Err(AppError::InvalidInput(
                    "An event can only be approved or cancelled".into(),
                ));
            }
            changes.status = Some(status);
            changes.approved_by = Some(principal.user_id);
        }

        if changes.is_empty() {
            if input.has_details() || input.status.is_some() {
                return Err(AppError::Forbidden);
            }
            return Ok(event);
        }

        let updated = self.event_repo.update(id, &changes).await?;
        info!(event_id = %id, status = %updated.status, "Event updated");
        Ok(updated)
    }

    /// Hide the event from both partners. Either partner may do this.
    pub async fn soft_delete(&self, principal: Principal, id: Uuid) -> AppResult<EventProfile> {
        self.get(principal, id).await?;
        self.event_repo.soft_delete(id).await
    }

    /// Permanent removal, reserved to the creator.
    #[instrument(skip(self))]
    pub async fn delete(&self, principal: Principal, id: Uuid) -> AppResult<()> {
        let event = self.get(principal, id).await?;
        if event.created_by != principal.user_id {
            return Err(AppError::Forbidden);
        }
        self.event_repo.delete(id).await?;
        info!(event_id = %id, "Event deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{InMemoryPersistence, create_test_user};
    use chrono::Duration;

    struct Fixture {
        store: Arc<InMemoryPersistence>,
        events: EventUseCases,
        a: Principal,
        b: Principal,
    }

    fn fixture() -> Fixture {
        let couple_id = Uuid::new_v4();
        let member = || {
            create_test_user(|u| {
                u.couple_id = Some(couple_id);
                u.is_connected = true;
            })
            .principal()
        };
        let store = Arc::new(InMemoryPersistence::new());
        Fixture {
            events: EventUseCases::new(store.clone()),
            store,
            a: member(),
            b: member(),
        }
    }

    fn dinner(date: DateTime<Utc>) -> CreateEventInput {
        CreateEventInput {
            title: "  Dinner  ".to_string(),
            description: Some("Anniversary".to_string()),
            date,
            time: Some("19:30".to_string()),
            location: Some("Harbor".to_string()),
            lat: Some(59.91),
            lon: Some(10.75),
        }
    }

    #[tokio::test]
    async fn test_create_requires_couple_and_starts_pending() {
        let f = fixture();
        let single = create_test_user(|_| {}).principal();

        let rejected = f
            .events
            .create(single, dinner(Utc::now() + Duration::days(3)))
            .await;
        assert!(matches!(rejected, Err(AppError::InvalidInput(_))));

        let event = f
            .events
            .create(f.a, dinner(Utc::now() + Duration::days(3)))
            .await
            .unwrap();
        assert_eq!(event.title, "Dinner");
        assert_eq!(event.status, EventStatus::Pending);
        assert_eq!(Some(event.couple_id), f.a.couple_id);
        assert!(event.approved_by.is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let f = fixture();
        let mut blank = dinner(Utc::now());
        blank.title = "   ".to_string();
        assert!(matches!(
            f.events.create(f.a, blank).await,
            Err(AppError::InvalidInput(_))
        ));

        let mut off_map = dinner(Utc::now());
        off_map.lat = Some(91.0);
        assert!(matches!(
            f.events.create(f.a, off_map).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_list_is_ordered_and_rolls_over_past_events() {
        let f = fixture();
        let later = f
            .events
            .create(f.a, dinner(Utc::now() + Duration::days(10)))
            .await
            .unwrap();
        let sooner = f
            .events
            .create(f.b, dinner(Utc::now() + Duration::days(1)))
            .await
            .unwrap();
        let gone = f
            .events
            .create(f.a, dinner(Utc::now() - Duration::days(1)))
            .await
            .unwrap();
        let called_off = f
            .events
            .create(f.a, dinner(Utc::now() - Duration::days(2)))
            .await
            .unwrap();
        f.events
            .update(
                f.b,
                called_off.id,
                UpdateEventInput {
                    status: Some(EventStatus::Cancelled),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let listed = f.events.list(f.b).await.unwrap();

        let ids: Vec<Uuid> = listed.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![called_off.id, gone.id, sooner.id, later.id]);
        assert_eq!(listed[0].status, EventStatus::Cancelled);
        assert_eq!(listed[1].status, EventStatus::Past);
        assert_eq!(listed[2].status, EventStatus::Pending);
    }

    #[tokio::test]
    async fn test_other_couple_is_forbidden() {
        let f = fixture();
        let event = f
            .events
            .create(f.a, dinner(Utc::now() + Duration::days(1)))
            .await
            .unwrap();
        let stranger = create_test_user(|u| u.couple_id = Some(Uuid::new_v4())).principal();

        assert!(matches!(
            f.events.get(stranger, event.id).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            f.events.soft_delete(stranger, event.id).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            f.events.get(f.a, Uuid::new_v4()).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_partner_approves_and_creator_edits() {
        let f = fixture();
        let event = f
            .events
            .create(f.a, dinner(Utc::now() + Duration::days(1)))
            .await
            .unwrap();

        let approved = f
            .events
            .update(
                f.b,
                event.id,
                UpdateEventInput {
                    status: Some(EventStatus::Approved),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(approved.status, EventStatus::Approved);
        assert_eq!(approved.approved_by, Some(f.b.user_id));

        let edited = f
            .events
            .update(
                f.a,
                event.id,
                UpdateEventInput {
                    title: Some("Late dinner".to_string()),
                    time: Some("21:00".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.title, "Late dinner");
        assert_eq!(edited.time.as_deref(), Some("21:00"));
        assert_eq!(edited.location.as_deref(), Some("Harbor"));
        assert_eq!(edited.status, EventStatus::Approved);
    }

    #[tokio::test]
    async fn test_roles_cannot_cross() {
        let f = fixture();
        let event = f
            .events
            .create(f.a, dinner(Utc::now() + Duration::days(1)))
            .await
            .unwrap();

        // The creator cannot approve their own proposal.
        let self_approval = f
            .events
            .update(
                f.a,
                event.id,
                UpdateEventInput {
                    status: Some(EventStatus::Approved),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(self_approval, Err(AppError::Forbidden)));

        let partner_edit = f
            .events
            .update(
                f.b,
                event.id,
                UpdateEventInput {
                    title: Some("Mine now".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(partner_edit, Err(AppError::Forbidden)));

        let rewind = f
            .events
            .update(
                f.b,
                event.id,
                UpdateEventInput {
                    status: Some(EventStatus::Past),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(rewind, Err(AppError::InvalidInput(_))));

        let stored = f.events.get(f.a, event.id).await.unwrap();
        assert_eq!(stored.title, "Dinner");
        assert_eq!(stored.status, EventStatus::Pending);
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let f = fixture();
        let event = f
            .events
            .create(f.a, dinner(Utc::now() + Duration::days(1)))
            .await
            .unwrap();

        assert!(matches!(
            f.events.delete(f.b, event.id).await,
            Err(AppError::Forbidden)
        ));

        let hidden = f.events.soft_delete(f.b, event.id).await.unwrap();
        assert!(hidden.is_deleted);
        assert!(f.events.list(f.a).await.unwrap().is_empty());
        assert!(matches!(
            f.events.get(f.a, event.id).await,
            Err(AppError::NotFound)
        ));

        let kept = f
            .events
            .create(f.a, dinner(Utc::now() + Duration::days(2)))
            .await
            .unwrap();
        f.events.delete(f.a, kept.id).await.unwrap();
        assert_eq!(f.store.event_count(), 1);
    }
}
