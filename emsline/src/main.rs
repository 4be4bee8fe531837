#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::{Color, Colorize};
use ems::claims;
use ems::token::{BrowserCookies, SessionTokens};
use ems::types::{
    Device, DeviceCreateRequest, DeviceUpdateRequest, HomeType, LoginRequest, UnitEnergy, User,
    UserRole, UserUpdateRequest,
};
use ems::{ActionResult, EmsClient, ExecutionContext, GuardError, Redirect, Session};
use emsconfig::EmsConfig;
use std::fmt::Write;
use std::process;
use std::sync::Arc;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};
use tracing_subscriber::EnvFilter;
mod chart;

#[derive(Parser)]
#[command(name = "emsline", about = "A CLI for the energy management dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and keep the session for later commands
    Login {
        /// Login name (defaults to `username` from the config file)
        #[arg(long, short)]
        username: Option<String>,
    },
    /// Create an account and log into it
    Register {
        /// Login name (defaults to `username` from the config file)
        #[arg(long, short)]
        username: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the profile of the logged-in user
    Whoami,
    /// List your devices
    Devices {
        /// List every device (admin only)
        #[arg(long)]
        all: bool,
    },
    /// Register a device (admin only)
    DeviceAdd {
        /// Device name
        name: String,
        /// Maximum hourly consumption the device is rated for
        max_consumption: i32,
        /// Owner of the device (defaults to yourself)
        #[arg(long)]
        user: Option<String>,
    },
    /// Rename a device or change its rated maximum
    DeviceUpdate {
        /// Device ID
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New maximum hourly consumption
        #[arg(long)]
        max_consumption: Option<i32>,
    },
    /// Delete a device, or every device with --all (admin only)
    DeviceRm {
        /// Device ID
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<String>,
        /// Delete every device
        #[arg(long)]
        all: bool,
    },
    /// List all users (admin only)
    Users,
    /// Update a profile
    #[command(
        long_about = "Update a profile.\n\nWithout --user the logged-in user's profile is updated.\nWith --user an admin updates another user's profile.\n\nExample:\n  emsline profile-update --unit-energy WH --goal-kwh-month 250"
    )]
    ProfileUpdate {
        /// Unit used for display (KWH or WH)
        #[arg(long)]
        unit_energy: Option<UnitEnergy>,
        /// Kind of home (APARTMENT, HOUSE, OFFICE, INDUSTRIAL)
        #[arg(long)]
        home_type: Option<HomeType>,
        /// Monthly consumption goal in kWh
        #[arg(long)]
        goal_kwh_month: Option<i64>,
        /// Profile to update (admin only)
        #[arg(long)]
        user: Option<String>,
    },
    /// Show a device's hourly consumption for one day
    Consumption {
        /// Device ID
        device: String,
        /// Day as YYYY-MM-DD (defaults to today)
        #[arg(long, value_parser = parse_day)]
        day: Option<Date>,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions {
        /// The shell to generate completions for
        shell: Shell,
    },
    /// List device IDs (for shell completion)
    #[command(hide = true)]
    ListDevices,
}

fn parse_day(value: &str) -> Result<Date, String> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map_err(|err| format!("expected YYYY-MM-DD: {err}"))
}

fn today() -> Date {
    let now = OffsetDateTime::now_utc();
    UtcOffset::current_local_offset()
        .map_or_else(|_| now, |offset| now.to_offset(offset))
        .date()
}

fn get_session(config: &EmsConfig) -> Session {
    let settings = config.client_settings();
    let store = Arc::new(BrowserCookies::new(settings.cookie.clone()));
    tracing::debug!(path = %store.path().display(), mode = ?settings.mode, "client session");
    let tokens = SessionTokens::new(ExecutionContext::Client).with_client_store(store);
    let client = EmsClient::new(settings, ExecutionContext::Client);
    Session::new(&client, tokens)
}

/// Turns a write outcome into its data, or into the error the CLI reports.
fn committed<T>(result: ActionResult<T>) -> Result<Option<T>> {
    if result.success {
        return Ok(result.data);
    }
    if let Some(location) = result.redirect {
        return Err(Redirect::to(location).into());
    }
    Err(anyhow::anyhow!(result
        .error
        .unwrap_or_else(|| ems::session::UNEXPECTED_ERROR.to_string())))
}

fn format_device(device: &Device, owner: bool) -> String {
    let name_padded = format!("{:24}", device.name);
    let mut line = format!("{} {name_padded} max {}", device.id.dimmed(), device.max_consumption);
    if owner {
        let _ = write!(line, "  owner {}", device.user_id.dimmed());
    }
    line
}

fn format_user(user: &User) -> String {
    format!(
        "{}  {:10} {:3}  goal {} kWh/month",
        user.id,
        user.home_type.to_string(),
        user.unit_energy.to_string(),
        user.goal_kwh_month
    )
}

fn redirect_message(redirect: &Redirect) -> String {
    let location = redirect.location();
    if location.contains("reason=expired") {
        "session expired, run `emsline login`".to_string()
    } else if location.starts_with(ems::routes::LOGIN_ROUTE) {
        "not logged in, run `emsline login`".to_string()
    } else {
        "this command needs an admin session".to_string()
    }
}

fn handle_error(err: &anyhow::Error) -> ! {
    let redirect = err.downcast_ref::<Redirect>().or_else(|| {
        err.downcast_ref::<GuardError>()
            .and_then(GuardError::redirect)
    });
    if let Some(redirect) = redirect {
        eprintln!("{}", redirect_message(redirect).color(Color::Yellow));
        process::exit(1);
    }

    let api = err
        .downcast_ref::<ems::Error>()
        .or_else(|| match err.downcast_ref::<GuardError>() {
            Some(GuardError::Failed(err)) => Some(err),
            _ => None,
        })
        .and_then(ems::Error::as_api);
    if let Some(api) = api {
        eprintln!("API error ({}): {}", api.status, api.message);
        if let Some(body) = api.body.as_ref().filter(|body| body.get("message").is_none()) {
            if let Ok(pretty) = serde_json::to_string_pretty(body) {
                eprintln!("{pretty}");
            }
        }
        process::exit(1);
    }

    eprintln!("{err}");
    process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        handle_error(&err);
    }

    Ok(())
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "emsline", &mut std::io::stdout());
        return Ok(());
    }

    let config = EmsConfig::load().with_context(|| "Failed to load ems config")?;
    let session = get_session(&config);

    match cli.command {
        Command::Completions { .. } => {}
        Command::Login { username } => {
            let username = config.username(username.as_deref())?;
            let password = config.password()?;
            committed(session.login(&LoginRequest::new(&username, password)).await)?;
            println!("Logged in as {}", username.bold());
        }
        Command::Register { username } => {
            let username = config.username(username.as_deref())?;
            let password = config.password()?;
            committed(session.register(&LoginRequest::new(&username, password)).await)?;
            println!("Registered and logged in as {}", username.bold());
        }
        Command::Logout => {
            session.logout();
            println!("Logged out.");
        }
        Command::Whoami => {
            let token = session.guard().require_token()?;
            let claims = claims::decode(Some(&token));
            let client = session.client();
            let user = session
                .guard()
                .with_auth_handling(|| client.me(&token))
                .await?;
            let role = match claims.as_ref().and_then(claims::Claims::user_role) {
                Some(UserRole::Admin) => UserRole::Admin.to_string().color(Color::Magenta),
                Some(role) => role.to_string().normal(),
                None => "unknown role".dimmed(),
            };
            println!("{} ({role})", claims::display_label(claims.as_ref(), "User").bold());
            println!("{}", format_user(&user));
        }
        Command::Devices { all } => {
            let devices = if all {
                session.admin_console().await?.devices
            } else {
                session.dashboard_for(today()).await?.devices
            };
            for device in &devices {
                println!("{}", format_device(device, all));
            }
        }
        Command::ListDevices => {
            let data = session.dashboard_for(today()).await?;
            for device in data.devices {
                println!("{}", device.id);
            }
        }
        Command::DeviceAdd {
            name,
            max_consumption,
            user,
        } => {
            let owner = match user {
                Some(user) => user,
                None => {
                    let token = session.guard().require_token()?;
                    claims::decode(Some(&token))
                        .and_then(|claims| claims.sub)
                        .context("Cannot tell who you are from the session; pass --user")?
                }
            };
            let payload = DeviceCreateRequest::new(owner, name, max_consumption);
            committed(session.admin_create_device(&payload).await?)?;
            println!("Device {} added.", payload.name.bold());
        }
        Command::DeviceUpdate {
            id,
            name,
            max_consumption,
        } => {
            if name.is_none() && max_consumption.is_none() {
                anyhow::bail!("Nothing to update; pass --name and/or --max-consumption");
            }
            let mut update = DeviceUpdateRequest::new(&id);
            if let Some(name) = name {
                update = update.with_name(&name);
            }
            if let Some(max) = max_consumption {
                update = update.with_max_consumption(max);
            }
            committed(session.update_device(&update).await?)?;
            println!("Device {} updated.", id.bold());
        }
        Command::DeviceRm { id, all } => {
            if all {
                committed(session.admin_delete_all_devices().await?)?;
                println!("All devices deleted.");
            } else if let Some(id) = id {
                committed(session.delete_device(&id).await?)?;
                println!("Device {} deleted.", id.bold());
            }
        }
        Command::Users => {
            let data = session.admin_console().await?;
            for user in &data.users {
                println!("{}", format_user(user));
            }
        }
        Command::ProfileUpdate {
            unit_energy,
            home_type,
            goal_kwh_month,
            user,
        } => {
            let mut update = UserUpdateRequest::new();
            if let Some(unit) = unit_energy {
                update = update.with_unit_energy(unit);
            }
            if let Some(home_type) = home_type {
                update = update.with_home_type(home_type);
            }
            if let Some(goal) = goal_kwh_month {
                update = update.with_goal_kwh_month(goal);
            }
            let result = match user {
                Some(user) => session.admin_update_user(&update.for_user(user)).await?,
                None => session.update_profile(&update).await?,
            };
            committed(result)?;
            println!("Profile updated.");
        }
        Command::Consumption { device, day } => {
            let day = day.unwrap_or_else(today);
            let dashboard = session.dashboard_for(day).await?;
            let known = dashboard.devices.iter().find(|known| known.id == device);
            let consumption = committed(session.fetch_consumption(&device, day).await?)?
                .context("Backend returned no consumption data")?;
            println!(
                "{}",
                chart::render(&consumption, known, dashboard.user.unit_energy)
            );
        }
    }

    Ok(())
}
