use chrono::{DateTime, Datelike, Days, Utc, Weekday};
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    db::timestamp,
    error::OpError,
    models::{WorkSlotRow, SLOT_AVAILABLE, SLOT_RESERVED},
};

/// Daily booking times offered on the work schedule.
pub const SLOT_HOURS: [u32; 4] = [9, 11, 13, 15];
/// Candidates cover the next ten working days.
pub const SLOT_WEEKDAYS: usize = 10;

/// Walk forward from `now`, skipping weekends, and emit the fixed daily
/// times for the next ten weekdays. Instants at or before `now` are
/// discarded, as is any candidate whose exact timestamp is already taken.
pub fn candidate_slots(now: DateTime<Utc>, taken: &[DateTime<Utc>]) -> Vec<DateTime<Utc>> {
    let mut slots = Vec::new();
    let mut day = now.date_naive();
    let mut weekdays = 0;
    while weekdays < SLOT_WEEKDAYS {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            for hour in SLOT_HOURS {
                let Some(slot) = day.and_hms_opt(hour, 0, 0) else {
                    continue;
                };
                let slot = slot.and_utc();
                if slot > now && !taken.contains(&slot) {
                    slots.push(slot);
                }
            }
            weekdays += 1;
        }
        day = day + Days::new(1);
    }
    slots
}

/// Expired slots are dropped unconditionally. Must run before candidate
/// computation so stale rows are not counted as taken.
pub async fn purge_expired(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM work_schedule WHERE datetime < ?")
        .bind(timestamp(now))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

async fn taken_timestamps(pool: &SqlitePool) -> Result<Vec<DateTime<Utc>>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String,)>(
        "SELECT datetime FROM work_schedule WHERE state IN (?, ?)",
    )
    .bind(SLOT_AVAILABLE)
    .bind(SLOT_RESERVED)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(raw,)| match DateTime::parse_from_rfc3339(&raw) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(err) => {
                log::warn!("Unparseable slot timestamp {raw:?}: {err}");
                None
            }
        })
        .collect())
}

/// Purge expired slots, then compute the surviving candidates for manual
/// insertion by the clerk.
pub async fn generate_candidates(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, OpError> {
    purge_expired(pool, now).await?;
    let taken = taken_timestamps(pool).await?;
    Ok(candidate_slots(now, &taken))
}

pub async fn open_slots(pool: &SqlitePool) -> Result<Vec<WorkSlotRow>, sqlx::Error> {
    sqlx::query_as::<_, WorkSlotRow>(
        "SELECT id, datetime, state FROM work_schedule WHERE state = ? ORDER BY datetime ASC",
    )
    .bind(SLOT_AVAILABLE)
    .fetch_all(pool)
    .await
}

/// Insert a new available slot. The candidate list already filters taken
/// timestamps, but the same guard is enforced here so a stale candidate
/// cannot create a duplicate.
pub async fn insert_slot(
    pool: &SqlitePool,
    slot: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<WorkSlotRow, OpError> {
    if slot <= now {
        return Err(OpError::Validation(
            "Work slots must be in the future.".to_string(),
        ));
    }

    let stamp = timestamp(slot);
    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM work_schedule WHERE datetime = ? AND state IN (?, ?)",
    )
    .bind(&stamp)
    .bind(SLOT_AVAILABLE)
    .bind(SLOT_RESERVED)
    .fetch_one(pool)
    .await?;

    if existing > 0 {
        return Err(OpError::Conflict(
            "A work slot already exists at that time.".to_string(),
        ));
    }

    let id = new_id();
    sqlx::query("INSERT INTO work_schedule (id, datetime, state) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(&stamp)
        .bind(SLOT_AVAILABLE)
        .execute(pool)
        .await?;

    Ok(WorkSlotRow {
        id,
        datetime: stamp,
        state: SLOT_AVAILABLE.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().unwrap()
    }

    #[test]
    fn candidates_are_future_weekday_business_hours() {
        // 2025-01-06 is a Monday.
        let now = at(2025, 1, 6, 10, 30);
        let slots = candidate_slots(now, &[]);
        assert!(!slots.is_empty());
        for slot in &slots {
            assert!(*slot > now);
            assert!(!matches!(slot.weekday(), Weekday::Sat | Weekday::Sun));
            assert!(SLOT_HOURS.contains(&slot.time().hour()));
        }
    }

    #[test]
    fn passed_hours_of_today_are_skipped() {
        let now = at(2025, 1, 6, 10, 30);
        let slots = candidate_slots(now, &[]);
        // 09:00 today already passed; 11:00, 13:00, 15:00 survive.
        assert_eq!(slots[0], at(2025, 1, 6, 11, 0));
        let today: Vec<_> = slots
            .iter()
            .filter(|s| s.date_naive() == now.date_naive())
            .collect();
        assert_eq!(today.len(), 3);
    }

    #[test]
    fn covers_ten_weekdays() {
        // Saturday morning: nothing emitted for the weekend.
        let now = at(2025, 1, 4, 8, 0);
        let slots = candidate_slots(now, &[]);
        assert_eq!(slots.len(), 10 * SLOT_HOURS.len());
        assert_eq!(slots[0], at(2025, 1, 6, 9, 0));
        // Ten weekdays from Mon 2025-01-06 end on Fri 2025-01-17.
        assert_eq!(slots.last().copied(), Some(at(2025, 1, 17, 15, 0)));
    }

    #[test]
    fn taken_timestamps_are_subtracted() {
        let now = at(2025, 1, 6, 8, 0);
        let taken = vec![at(2025, 1, 6, 9, 0), at(2025, 1, 7, 13, 0)];
        let slots = candidate_slots(now, &taken);
        for t in &taken {
            assert!(!slots.contains(t));
        }
        assert!(slots.contains(&at(2025, 1, 6, 11, 0)));
    }
}
