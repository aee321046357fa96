// Concurrency - capacity is never oversold and a stay is billed once,
// with many threads racing against one shared store

use parking_engine::availability;
use parking_engine::{
    EngineError, MemoryStore, NewFacility, NewTariff, ParkingEngine, ParkingStore, SqliteStore,
    VehicleType,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const CONTENDERS: usize = 16;
const CAPACITY: u32 = 5;

fn sqlite_engine(dir: &tempfile::TempDir) -> Arc<ParkingEngine<SqliteStore>> {
    let store = SqliteStore::open(dir.path().join("lots.db"), Duration::from_secs(30)).unwrap();
    Arc::new(ParkingEngine::new(store))
}

fn create_lot<S: ParkingStore>(engine: &ParkingEngine<S>) -> i64 {
    engine
        .create_facility(NewFacility {
            name: "Stadium".to_string(),
            capacity: BTreeMap::from([(VehicleType::CarSUV, CAPACITY)]),
        })
        .unwrap()
        .id
}

/// Launch CONTENDERS simultaneous admissions and return their outcomes.
fn race_admissions<S: ParkingStore + 'static>(
    engine: &Arc<ParkingEngine<S>>,
    lot: i64,
) -> Vec<Result<i64, EngineError>> {
    let barrier = Arc::new(Barrier::new(CONTENDERS));

    let handles: Vec<_> = (0..CONTENDERS)
        .map(|i| {
            let engine = Arc::clone(engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine
                    .admit(lot, VehicleType::CarSUV, &format!("CAR-{i:03}"))
                    .map(|stay| stay.id)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

fn assert_capacity_held<S: ParkingStore>(engine: &ParkingEngine<S>, lot: i64, results: &[Result<i64, EngineError>]) {
    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::NoAvailableSpots { .. })))
        .count();

    assert_eq!(admitted, CAPACITY as usize);
    assert_eq!(refused, CONTENDERS - CAPACITY as usize);

    let occupied = engine
        .store()
        .atomically(|uow| availability::occupancy(uow, lot))
        .unwrap();
    assert_eq!(occupied.get(&VehicleType::CarSUV).copied(), Some(CAPACITY));
    assert_eq!(engine.get_available_spots(lot).unwrap()[&VehicleType::CarSUV], 0);
}

#[test]
fn test_sqlite_admissions_never_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let engine = sqlite_engine(&dir);
    let lot = create_lot(&*engine);

    let results = race_admissions(&engine, lot);
    assert_capacity_held(&*engine, lot, &results);
}

#[test]
fn test_memory_admissions_never_oversell() {
    let engine = Arc::new(ParkingEngine::new(MemoryStore::new()));
    let lot = create_lot(&*engine);

    let results = race_admissions(&engine, lot);
    assert_capacity_held(&*engine, lot, &results);
}

#[test]
fn test_concurrent_exits_issue_one_receipt() {
    let dir = tempfile::tempdir().unwrap();
    let engine = sqlite_engine(&dir);
    let lot = create_lot(&*engine);

    engine
        .create_tariff(NewTariff {
            facility_id: lot,
            vehicle_type: VehicleType::CarSUV,
            base_rate: Decimal::ZERO,
            base_hours: 0,
            hourly_rate: "4.00".parse().unwrap(),
            daily_rate: Decimal::ZERO,
            daily_rate_hours: 0,
        })
        .unwrap();
    let stay = engine.admit(lot, VehicleType::CarSUV, "RACE-1").unwrap();

    let barrier = Arc::new(Barrier::new(CONTENDERS));
    let handles: Vec<_> = (0..CONTENDERS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.exit(stay.id)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(EngineError::AlreadyExited { .. }))));

    let (closed, receipt) = winners[0];
    assert_eq!(receipt.fee, "4.00".parse::<Decimal>().unwrap());
    assert_eq!(engine.get_receipt(stay.id).unwrap(), *receipt);
    assert_eq!(engine.get_stay(stay.id).unwrap().exit_time(), closed.exit_time());
}
