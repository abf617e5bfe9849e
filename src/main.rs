//! Geotag CLI - geotagged content store with proximity search

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use geotag::cache::{Cache, MemoryCache};
use geotag::config::{self, GeotagConfig};
use geotag::geocode::{self, Geocoder};
use geotag::query::{LocationQuery, LocationResolver, ProximityEngine, SearchRequest};
use geotag::server::{self, AppState};
use geotag::settings::Settings;
use geotag::ui::{self, Icons};
use geotag::{AddressFragments, Coordinate, EntityRef, EntityStatus, GeoFields, GeoStore};

#[derive(Parser)]
#[command(name = "geotag")]
#[command(version)]
#[command(about = "Geotagged content store with location resolution and proximity search")]
#[command(long_about = r#"
Geotag keeps coordinates and addresses for content entities and answers
"what is near here?" questions:
  • Tag entities with coordinates or a geocoded address
  • Resolve free-form locations through stored matches and a geocoder
  • Radius search, nearest first, over published entities

Example usage:
  geotag entity 42 --type post --status publish --title "Brixton Market"
  geotag tag 42 --lat 51.4613 --lon -0.1156 --reverse
  geotag search --city Brixton --radius 5
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register or update a content entity
    Entity {
        /// Entity id
        id: i64,

        /// Entity type (post, page, ...)
        #[arg(short = 't', long = "type", default_value = "post")]
        entity_type: String,

        /// Publication status
        #[arg(short, long, default_value = "publish")]
        status: String,

        /// Display title
        #[arg(long, default_value = "")]
        title: String,
    },

    /// Store geodata for an entity, replacing what was there
    Tag {
        /// Entity id
        id: i64,

        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,

        #[command(flatten)]
        address: AddressArgs,

        #[arg(long)]
        website: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        /// Fill the address from the coordinates via reverse geocoding
        #[arg(long)]
        reverse: bool,

        /// Look up coordinates for the address when none are given
        #[arg(long = "geocode")]
        forward: bool,
    },

    /// Show the geodata stored for an entity
    Show {
        /// Entity id
        id: i64,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Remove the geodata stored for an entity
    Untag {
        /// Entity id
        id: i64,
    },

    /// Find published entities near a location
    Search {
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<String>,

        #[arg(long, allow_hyphen_values = true)]
        lon: Option<String>,

        #[command(flatten)]
        address: AddressArgs,

        /// Search radius in kilometers (defaults to the default_radius setting)
        #[arg(short, long)]
        radius: Option<f64>,

        /// Restrict to one entity type
        #[arg(short = 't', long = "type")]
        entity_type: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Read or write named settings
    Setting {
        #[command(subcommand)]
        action: SettingAction,
    },

    /// Forward-geocode an address
    Geocode {
        /// Free-form address text
        address: String,
    },

    /// Reverse-geocode a coordinate
    Reverse {
        #[arg(allow_hyphen_values = true)]
        lat: f64,

        #[arg(allow_hyphen_values = true)]
        lon: f64,
    },

    /// Show statistics about the store
    Stats,

    /// Start the HTTP API
    Serve {
        /// Port to listen on (overrides the config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum SettingAction {
    /// Print one setting
    Get { name: String },

    /// Store a setting; the value is parsed as JSON, falling back to a string
    Set { name: String, value: String },

    /// List every stored setting
    List,
}

#[derive(clap::Args, Default)]
struct AddressArgs {
    #[arg(long)]
    street: Option<String>,

    #[arg(long)]
    city: Option<String>,

    #[arg(long)]
    state: Option<String>,

    #[arg(long)]
    zip: Option<String>,

    #[arg(long)]
    country: Option<String>,
}

impl From<AddressArgs> for AddressFragments {
    fn from(args: AddressArgs) -> Self {
        AddressFragments {
            street: args.street,
            city: args.city,
            state: args.state,
            zip: args.zip,
            country: args.country,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Commands::Init { force } = cli.command {
        let path = cli.config.unwrap_or_else(config::default_config_path);
        config::write_config(&path, &GeotagConfig::default(), force)?;
        ui::success(&format!("Wrote {}", path.display()));
        return Ok(());
    }

    let cfg = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let default_location = cfg.default_location()?;
    let db_path = cli.database.clone().unwrap_or_else(|| cfg.database_path());
    let store = open_store(&db_path, &cfg)?;

    match cli.command {
        // Written before any store is opened
        Commands::Init { .. } => {}

        Commands::Entity { id, entity_type, status, title } => {
            let status: EntityStatus = status.parse()?;
            let entity = EntityRef::new(id, entity_type, status).with_title(title);
            if store.upsert_entity(&entity)? {
                ui::success(&format!("Entity {} saved ({}, {})", id, entity.entity_type, entity.status));
            } else {
                anyhow::bail!("failed to save entity {}", id);
            }
        }

        Commands::Tag { id, lat, lon, address, website, email, phone, reverse, forward } => {
            let fragments = AddressFragments::from(address);
            let mut fields = GeoFields {
                latitude: lat,
                longitude: lon,
                street: fragments.street.clone(),
                city: fragments.city.clone(),
                state: fragments.state.clone(),
                zip: fragments.zip.clone(),
                country: fragments.country.clone(),
                website,
                email,
                phone,
            };

            if forward || reverse {
                let geocoder = build_geocoder(&store, &cfg)?;

                if forward && fields.latitude.is_none() && fields.longitude.is_none() {
                    if fragments.is_empty() {
                        anyhow::bail!("--geocode needs an address");
                    }
                    match geocoder.forward_geocode(&fragments.query_text()).await? {
                        Some(at) => {
                            ui::info("Geocoded", &at.to_string());
                            fields.latitude = Some(at.latitude);
                            fields.longitude = Some(at.longitude);
                        }
                        None => ui::warn("No coordinates found for that address"),
                    }
                }

                if reverse {
                    let (Some(lat), Some(lon)) = (fields.latitude, fields.longitude) else {
                        anyhow::bail!("--reverse needs coordinates");
                    };
                    match geocoder.reverse_geocode(Coordinate::new(lat, lon)?).await? {
                        Some(found) => fields.fill_address(&found),
                        None => ui::warn("No address found for those coordinates"),
                    }
                }
            }

            if store.update_record(id, &fields)? {
                ui::success(&format!("Geodata saved for entity {}", id));
                if let Some(record) = store.get_record(id) {
                    println!("{}", ui::record_table(&record));
                }
            } else {
                anyhow::bail!("failed to save geodata for entity {}", id);
            }
        }

        Commands::Show { id, json } => match store.get_record(id) {
            Some(record) if json => println!("{}", serde_json::to_string_pretty(&record)?),
            Some(record) => {
                ui::header(Icons::PIN, &format!("Entity {}", id));
                println!("{}", ui::record_table(&record));
            }
            None => ui::warn(&format!("No geodata for entity {}", id)),
        },

        Commands::Untag { id } => {
            if store.delete_record(id) {
                ui::success(&format!("Geodata removed for entity {}", id));
            } else {
                anyhow::bail!("failed to remove geodata for entity {}", id);
            }
        }

        Commands::Search { lat, lon, address, radius, entity_type, json } => {
            let settings = Settings::load(&store);
            let geocoder = geocode::from_settings(&settings, &cfg.geocoder)?;
            let resolver = LocationResolver::new(&store, geocoder.as_ref(), default_location)
                .with_timeout(cfg.geocoder.timeout());
            let engine = ProximityEngine::new(&store, resolver).with_default_radius(settings.default_radius_km);

            let request = SearchRequest {
                location: LocationQuery {
                    latitude: lat,
                    longitude: lon,
                    address: address.into(),
                },
                radius_km: radius,
                entity_type,
            };
            let outcome = engine.search(&request).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }

            match (outcome.provenance, outcome.radius_km) {
                (Some(provenance), Some(radius_km)) => {
                    ui::header(Icons::SEARCH, &format!("Within {} km of {}", radius_km, outcome.center));
                    ui::info("Center", &ui::provenance(provenance.as_str()));
                }
                _ => ui::header(Icons::GLOBE, "All geotagged entities"),
            }

            if outcome.hits.is_empty() {
                ui::warn("No entities found");
            } else {
                println!("{}", ui::hits_table(&outcome.hits));
            }
        }

        Commands::Setting { action } => match action {
            SettingAction::Get { name } => match store.get_setting_value(&name)? {
                Some(value) => println!("{}", value),
                None => ui::warn(&format!("{} is not set", name)),
            },
            SettingAction::Set { name, value } => {
                let value: serde_json::Value =
                    serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
                if store.update_setting(&name, &value) {
                    ui::success(&format!("{} = {}", name, value));
                } else {
                    anyhow::bail!("failed to store setting {}", name);
                }
            }
            SettingAction::List => {
                let settings = store.list_settings()?;
                if settings.is_empty() {
                    ui::warn("No settings stored; defaults apply");
                } else {
                    ui::header(Icons::GEAR, "Stored settings");
                    println!("{}", ui::settings_table(&settings));
                }
                ui::header(Icons::GEAR, "Effective settings");
                println!("{}", ui::effective_settings_table(&Settings::load(&store)));
            }
        },

        Commands::Geocode { address } => {
            let geocoder = build_geocoder(&store, &cfg)?;
            match geocoder.forward_geocode(&address).await? {
                Some(at) => ui::info(geocoder.name(), &at.to_string()),
                None => ui::warn("No match"),
            }
        }

        Commands::Reverse { lat, lon } => {
            let geocoder = build_geocoder(&store, &cfg)?;
            match geocoder.reverse_geocode(Coordinate::new(lat, lon)?).await? {
                Some(found) => {
                    ui::header(Icons::COMPASS, &format!("{}, {}", lat, lon));
                    println!("{}", serde_json::to_string_pretty(&found)?);
                }
                None => ui::warn("No address found"),
            }
        }

        Commands::Stats => {
            ui::header(Icons::STATS, "Store");
            ui::kv(Icons::DATABASE, &db_path.display().to_string());
            let stats = store.stats()?;
            let mut table = ui::TableBuilder::new();
            table.add_row("Settings", &stats.settings.to_string());
            table.add_row("Geodata records", &stats.records.to_string());
            table.add_row("With coordinates", &stats.geotagged.to_string());
            table.add_row("Entities", &stats.entities.to_string());
            println!("{}", table.build());
        }

        Commands::Serve { port } => {
            let geocoder = build_geocoder(&store, &cfg)?;
            let state = AppState {
                store,
                geocoder,
                default_location,
                geocode_timeout: cfg.geocoder.timeout(),
            };
            server::start_server(port.unwrap_or(cfg.server.port), state).await?;
        }
    }

    Ok(())
}

fn open_store(db_path: &Path, cfg: &GeotagConfig) -> anyhow::Result<GeoStore> {
    config::ensure_db_dir(db_path)?;
    let cache: Arc<dyn Cache> = match cfg.cache.ttl_secs {
        Some(secs) => Arc::new(MemoryCache::with_ttl(Duration::from_secs(secs))),
        None => Arc::new(MemoryCache::new()),
    };
    tracing::debug!("Opening {}", db_path.display());
    Ok(GeoStore::open_with_cache(db_path, cache)?)
}

fn build_geocoder(store: &GeoStore, cfg: &GeotagConfig) -> anyhow::Result<Arc<dyn Geocoder>> {
    let settings = Settings::load(store);
    Ok(geocode::from_settings(&settings, &cfg.geocoder)?)
}
