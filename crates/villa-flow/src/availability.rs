//! Calendar availability checks for a listing and date range.
//!
//! Ranges are half-open: a stay ending on a date does not conflict with one
//! starting the same date.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, ValidationErrors};
use crate::store::{InquiryStore, ListingStatus};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AvailabilityQuery {
    #[serde(alias = "slug")]
    pub villa: Option<String>,
    #[serde(rename = "checkIn")]
    pub check_in: Option<String>,
    #[serde(rename = "checkOut")]
    pub check_out: Option<String>,
}

/// One blocked range overlapping the requested stay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AvailabilityOutcome {
    Available { nights: i64 },
    Unavailable { conflicts: Vec<ConflictRange> },
    /// No active listing under that slug. Distinct from unavailable so the
    /// site can fix a broken link instead of greying out a calendar.
    UnknownListing,
    Invalid(ValidationErrors),
}

pub struct AvailabilityService<S> {
    store: Arc<S>,
}

impl<S: InquiryStore> AvailabilityService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn check(&self, query: AvailabilityQuery) -> Result<AvailabilityOutcome, FlowError> {
        let mut errors = ValidationErrors::default();

        let slug = query
            .villa
            .as_deref()
            .map(str::trim)
            .filter(|slug| !slug.is_empty());
        if slug.is_none() {
            errors.push("villa", "villa slug is required");
        }

        let check_in = parse_date(query.check_in.as_deref());
        if check_in.is_none() {
            errors.push("checkIn", "check-in must be an ISO date (YYYY-MM-DD)");
        }
        let check_out = parse_date(query.check_out.as_deref());
        if check_out.is_none() {
            errors.push("checkOut", "check-out must be an ISO date (YYYY-MM-DD)");
        }
        if let (Some(check_in), Some(check_out)) = (check_in, check_out) {
            if check_out <= check_in {
                errors.push("checkOut", "check-out must be after check-in");
            }
        }
        if !errors.is_empty() {
            return Ok(AvailabilityOutcome::Invalid(errors));
        }

        let (slug, check_in, check_out) = (
            slug.unwrap_or_default(),
            check_in.unwrap_or_default(),
            check_out.unwrap_or_default(),
        );

        let listing = match self.store.get_listing_by_slug(slug).await? {
            Some(listing) if listing.status == ListingStatus::Active => listing,
            _ => return Ok(AvailabilityOutcome::UnknownListing),
        };

        let conflicts: Vec<ConflictRange> = self
            .store
            .calendar_blocks_overlapping(&listing.id, check_in, check_out)
            .await?
            .into_iter()
            .map(|block| ConflictRange {
                start: block.start_date,
                end: block.end_date,
            })
            .collect();

        if conflicts.is_empty() {
            Ok(AvailabilityOutcome::Available {
                nights: (check_out - check_in).num_days(),
            })
        } else {
            Ok(AvailabilityOutcome::Unavailable { conflicts })
        }
    }
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw?.trim(), "%Y-%m-%d").ok()
}
