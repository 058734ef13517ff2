//! Demo data for running the server against in-memory stores.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use common::{ClinicId, ServiceId, UserId};
use reservation::{Clinic, InMemoryDirectory, Patient, Service};
use slot_store::{NewSlot, SlotStore};
use uuid::Uuid;

/// Fixed ids so the demo can be driven with curl.
pub const DEMO_USER_ID: Uuid = Uuid::from_u128(0x1);
pub const DEMO_CLINIC_ID: Uuid = Uuid::from_u128(0x100);
pub const DEMO_CONSULTATION_ID: Uuid = Uuid::from_u128(0x200);
pub const DEMO_ECG_ID: Uuid = Uuid::from_u128(0x201);

const SLOT_MINUTES: i64 = 30;
const OPENING_HOUR: i64 = 9;
const CLOSING_HOUR: i64 = 17;
const DAYS_AHEAD: i64 = 7;

/// What `seed_demo_data` created.
#[derive(Debug, Clone)]
pub struct DemoData {
    pub user_id: UserId,
    pub clinic_id: ClinicId,
    pub consultation_id: ServiceId,
    pub ecg_id: ServiceId,
    pub slots_created: usize,
}

/// Seeds one clinic with two services, a demo patient, and capacity-1
/// consultation slots every half hour between 09:00 and 17:00 UTC for each
/// of the next seven days.
pub async fn seed_demo_data<S: SlotStore>(
    slots: &S,
    directory: &InMemoryDirectory,
    now: DateTime<Utc>,
) -> slot_store::Result<DemoData> {
    let user_id = UserId::from_uuid(DEMO_USER_ID);
    let clinic_id = ClinicId::from_uuid(DEMO_CLINIC_ID);
    let consultation_id = ServiceId::from_uuid(DEMO_CONSULTATION_ID);
    let ecg_id = ServiceId::from_uuid(DEMO_ECG_ID);

    directory
        .add_clinic(Clinic {
            id: clinic_id,
            name: "Cardiology Department".to_string(),
            address: "123 Main St, Suite 200".to_string(),
            phone: "+1-555-0123".to_string(),
        })
        .await;
    directory
        .add_service(Service {
            id: consultation_id,
            clinic_id,
            name: "Cardiology Consultation".to_string(),
            description: "Initial consultation with cardiologist".to_string(),
            duration_min: SLOT_MINUTES as u32,
            price_cents: 25_000,
        })
        .await;
    directory
        .add_service(Service {
            id: ecg_id,
            clinic_id,
            name: "ECG Test".to_string(),
            description: "Electrocardiogram test".to_string(),
            duration_min: 15,
            price_cents: 15_000,
        })
        .await;
    directory
        .add_patient(Patient::new(user_id, "Demo Patient"))
        .await;

    let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let per_day = (CLOSING_HOUR - OPENING_HOUR) * 60 / SLOT_MINUTES;
    let mut slots_created = 0;

    for day in 1..=DAYS_AHEAD {
        let opening = midnight + Duration::days(day) + Duration::hours(OPENING_HOUR);
        for n in 0..per_day {
            let start = opening + Duration::minutes(n * SLOT_MINUTES);
            slots
                .create_slot(NewSlot::new(
                    consultation_id,
                    clinic_id,
                    start,
                    start + Duration::minutes(SLOT_MINUTES),
                    1,
                ))
                .await?;
            slots_created += 1;
        }
    }

    tracing::info!(%clinic_id, %user_id, slots_created, "seeded demo data");

    Ok(DemoData {
        user_id,
        clinic_id,
        consultation_id,
        ecg_id,
        slots_created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use reservation::PatientDirectory;
    use slot_store::InMemorySlotStore;

    #[tokio::test]
    async fn test_seeds_a_week_of_half_hour_slots() {
        let slots = InMemorySlotStore::new();
        let directory = InMemoryDirectory::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 14, 45, 0).unwrap();

        let demo = seed_demo_data(&slots, &directory, now).await.unwrap();
        assert_eq!(demo.slots_created, 7 * 16);

        let found = slots
            .find_available(demo.consultation_id, now, now + Duration::days(8))
            .await
            .unwrap();
        assert_eq!(found.len(), 7 * 16);
        assert!(found.iter().all(|s| s.capacity == 1 && s.available == 1));
        assert!(found.iter().all(|s| (9..17).contains(&s.start_time.hour())));
        assert!(found.iter().all(|s| s.start_time > now));

        let patient = directory.resolve_patient(demo.user_id).await.unwrap();
        assert_eq!(patient.display_name, "Demo Patient");
    }
}
