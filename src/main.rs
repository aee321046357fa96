use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;
use std::env;
use tracing_subscriber::EnvFilter;

use parking_engine::{Config, NewFacility, NewTariff, ParkingEngine, SqliteStore, VehicleType};

const USAGE: &str = "usage:
  parking-engine init
  parking-engine add-facility <name> <TYPE=capacity>...
  parking-engine add-tariff <lot> <TYPE> <base_rate> <base_hours> <hourly_rate> <daily_rate> <daily_rate_hours>
  parking-engine spots <lot>
  parking-engine admit <lot> <TYPE> <license_plate>
  parking-engine exit <entry>
  parking-engine fee <entry>

TYPE is one of MotorcycleScooter, CarSUV, BusTruck";

fn main() -> Result<()> {
    let config = Config::load(None).context("Failed to load configuration")?;
    init_tracing(&config);

    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        println!("{USAGE}");
        return Ok(());
    };

    let engine = open_engine(&config)?;

    match command.as_str() {
        "init" => {
            println!("✓ Database ready at {}", config.database_path.display());
        }
        "add-facility" => add_facility(&engine, rest)?,
        "add-tariff" => add_tariff(&engine, rest)?,
        "spots" => {
            let lot = parse_id(rest.first(), "lot")?;
            let spots = engine.get_available_spots(lot)?;
            println!("🅿️  Available spots in lot {lot}:");
            for (vehicle_type, free) in spots {
                println!("   {vehicle_type:<18} {free}");
            }
        }
        "admit" => {
            let [lot, vehicle_type, plate] = rest else {
                bail!("admit takes <lot> <TYPE> <license_plate>\n\n{USAGE}");
            };
            let stay = engine.admit(parse_id(Some(lot), "lot")?, vehicle_type.parse()?, plate)?;
            println!(
                "✓ Admitted {} as entry {} at {}",
                stay.license_plate, stay.id, stay.entry_time
            );
        }
        "exit" => {
            let entry = parse_id(rest.first(), "entry")?;
            let (stay, receipt) = engine.exit(entry)?;
            println!("🧾 Receipt {}", receipt.receipt_number);
            println!("   Vehicle:  {} ({})", stay.license_plate, stay.vehicle_type);
            println!("   Entry:    {}", receipt.entry_time);
            println!("   Exit:     {}", receipt.exit_time);
            println!("   Duration: {}", receipt.duration);
            println!("   Fee:      {}", receipt.fee);
        }
        "fee" => {
            let entry = parse_id(rest.first(), "entry")?;
            println!("{}", engine.calculate_fee(entry)?);
        }
        other => bail!("unknown command: {other}\n\n{USAGE}"),
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_target(false)
        .init();
}

fn open_engine(config: &Config) -> Result<ParkingEngine<SqliteStore>> {
    let store = SqliteStore::open(&config.database_path, config.busy_timeout())
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;
    Ok(ParkingEngine::new(store))
}

fn add_facility(engine: &ParkingEngine<SqliteStore>, args: &[String]) -> Result<()> {
    let Some((name, capacities)) = args.split_first() else {
        bail!("add-facility takes <name> <TYPE=capacity>...\n\n{USAGE}");
    };

    let mut capacity = BTreeMap::new();
    for pair in capacities {
        let (vehicle_type, count) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected TYPE=capacity, got {pair:?}"))?;
        let count: u32 = count
            .parse()
            .with_context(|| format!("capacity for {vehicle_type} must be a whole number"))?;
        capacity.insert(vehicle_type.parse::<VehicleType>()?, count);
    }

    let lot = engine.create_facility(NewFacility {
        name: name.clone(),
        capacity,
    })?;
    println!("✓ Created lot {} ({})", lot.id, lot.name);
    Ok(())
}

fn add_tariff(engine: &ParkingEngine<SqliteStore>, args: &[String]) -> Result<()> {
    let [lot, vehicle_type, base_rate, base_hours, hourly_rate, daily_rate, daily_rate_hours] = args
    else {
        bail!("add-tariff takes 7 arguments\n\n{USAGE}");
    };

    let tariff = engine.create_tariff(NewTariff {
        facility_id: parse_id(Some(lot), "lot")?,
        vehicle_type: vehicle_type.parse()?,
        base_rate: base_rate.parse().context("base_rate")?,
        base_hours: base_hours.parse().context("base_hours")?,
        hourly_rate: hourly_rate.parse().context("hourly_rate")?,
        daily_rate: daily_rate.parse().context("daily_rate")?,
        daily_rate_hours: daily_rate_hours.parse().context("daily_rate_hours")?,
    })?;
    println!(
        "✓ Created tariff {} for {} in lot {}",
        tariff.id, tariff.vehicle_type, tariff.facility_id
    );
    Ok(())
}

fn parse_id(raw: Option<&String>, what: &str) -> Result<i64> {
    let raw = raw.ok_or_else(|| anyhow!("missing <{what}>\n\n{USAGE}"))?;
    raw.parse()
        .with_context(|| format!("<{what}> must be a number, got {raw:?}"))
}
