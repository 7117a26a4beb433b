use clap::{Parser, Subcommand};
use sshdeck_core::{ConfigError, ConnectionManager, SshProfile};

#[derive(Parser)]
#[command(name = "sshdeck")]
#[command(about = "SSH connection manager that keeps your hand-written config untouched")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up sshdeck: discover keys, install the include line
    Init {
        /// Default private key path for new connections
        #[arg(long)]
        key: Option<String>,
    },

    /// Add a new connection
    Add {
        /// Connection name (becomes the Host alias)
        #[arg(long)]
        name: String,

        /// Hostname or IP address
        #[arg(long)]
        host: String,

        /// HostName override when it differs from the address
        #[arg(long)]
        hostname: Option<String>,

        /// Login user
        #[arg(long)]
        user: String,

        /// SSH port
        #[arg(long, default_value_t = 22)]
        port: u16,

        /// Path to the private key (falls back to the configured default)
        #[arg(long)]
        key: Option<String>,

        /// ProxyJump chain, e.g. "bastion" or "a@j1,b@j2"
        #[arg(long)]
        proxy_jump: Option<String>,

        /// LocalForward expression(s), comma-separated
        #[arg(long)]
        local_forward: Option<String>,

        /// RemoteForward expression(s), comma-separated
        #[arg(long)]
        remote_forward: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,

        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Extra directive as "Name=Value" (repeatable)
        #[arg(long = "option")]
        options: Vec<String>,
    },

    /// List all connections
    List,

    /// Show one connection by name or listing position
    Show { reference: String },

    /// Remove a connection by name or listing position
    Remove { reference: String },

    /// Update fields of an existing connection
    Update {
        /// Name or listing position of the connection to edit
        reference: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        hostname: Option<String>,

        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        key: Option<String>,

        #[arg(long)]
        proxy_jump: Option<String>,

        #[arg(long)]
        local_forward: Option<String>,

        #[arg(long)]
        remote_forward: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Record a use of a connection and print the ssh invocation
    Use { reference: String },

    /// Regenerate the managed SSH config file
    Refresh,

    /// Repair a broken or duplicated include line
    FixConfig,

    /// Restore the primary SSH config from backup and remove the managed file
    Reset,

    /// List discovered private keys
    Keys,

    /// Show or change stored settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current settings
    Show,
    /// Set the default private key for new connections
    SetKey { path: String },
}

pub fn run() -> i32 {
    let cli = Cli::parse();

    let mut manager = match ConnectionManager::new() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };

    match dispatch(cli.command, &mut manager) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

fn dispatch(command: Commands, manager: &mut ConnectionManager) -> Result<(), ConfigError> {
    match command {
        Commands::Init { key } => init(manager, key),
        Commands::Add {
            name,
            host,
            hostname,
            user,
            port,
            key,
            proxy_jump,
            local_forward,
            remote_forward,
            notes,
            tags,
            options,
        } => {
            let mut profile = SshProfile::new(name, host, user);
            profile.port = port;
            profile.hostname = hostname;
            profile.identity_file = key.or_else(|| manager.default_identity_file());
            profile.proxy_jump = proxy_jump;
            profile.local_forward = local_forward;
            profile.remote_forward = remote_forward;
            profile.notes = notes;
            profile.tags = tags;
            for option in options {
                let (directive, value) = parse_extra_option(&option)?;
                profile.extra_options.insert(directive, value);
            }

            let name = profile.name.clone();
            manager.add_connection(profile)?;
            println!("Added connection '{name}'");
            Ok(())
        }
        Commands::List => {
            let connections = manager.list_connections();
            if connections.is_empty() {
                println!("No connections yet. Add one with 'sshdeck add'.");
                return Ok(());
            }
            for (i, c) in connections.iter().enumerate() {
                println!("{:>3}. {:<20} {}@{}:{}", i + 1, c.name, c.user, c.host, c.port);
            }
            Ok(())
        }
        Commands::Show { reference } => {
            let profile = manager.resolve_connection(&reference)?;
            print_profile(profile);
            Ok(())
        }
        Commands::Remove { reference } => {
            let removed = manager.remove_connection(&reference)?;
            println!("Removed connection '{}'", removed.name);
            Ok(())
        }
        Commands::Update {
            reference,
            name,
            host,
            hostname,
            user,
            port,
            key,
            proxy_jump,
            local_forward,
            remote_forward,
            notes,
        } => {
            let mut edited = manager.resolve_connection(&reference)?.clone();
            if let Some(name) = name {
                edited.name = name;
            }
            if let Some(host) = host {
                edited.host = host;
            }
            if let Some(user) = user {
                edited.user = user;
            }
            if let Some(port) = port {
                edited.port = port;
            }
            // Empty string clears an optional field.
            apply_optional(&mut edited.hostname, hostname);
            apply_optional(&mut edited.identity_file, key);
            apply_optional(&mut edited.proxy_jump, proxy_jump);
            apply_optional(&mut edited.local_forward, local_forward);
            apply_optional(&mut edited.remote_forward, remote_forward);
            apply_optional(&mut edited.notes, notes);

            let name = edited.name.clone();
            manager.update_connection(edited)?;
            println!("Updated connection '{name}'");
            Ok(())
        }
        Commands::Use { reference } => {
            let name = manager.resolve_connection(&reference)?.name.clone();
            manager.record_use(&name)?;
            println!("ssh {name}");
            Ok(())
        }
        Commands::Refresh => {
            manager.refresh()?;
            println!(
                "Regenerated {}",
                manager.integration().managed_path().display()
            );
            Ok(())
        }
        Commands::FixConfig => {
            manager.fix_config()?;
            println!(
                "Repaired include line in {}",
                manager.integration().primary_path().display()
            );
            Ok(())
        }
        Commands::Reset => {
            manager.reset()?;
            println!(
                "Restored {} from backup",
                manager.integration().primary_path().display()
            );
            Ok(())
        }
        Commands::Keys => {
            let mut keys = manager.discover_keys();
            keys.sort();
            if keys.is_empty() {
                println!("No private keys found.");
            }
            for key in keys {
                println!("{}", key.display());
            }
            Ok(())
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                match manager.default_identity_file() {
                    Some(path) => println!("default key: {path}"),
                    None => println!("default key: (not set)"),
                }
                println!("initialized: {}", manager.is_initialized());
                Ok(())
            }
            ConfigCommands::SetKey { path } => {
                manager.set_default_identity_file(&path)?;
                println!("Default key set to {path}");
                Ok(())
            }
        },
    }
}

fn init(manager: &mut ConnectionManager, key: Option<String>) -> Result<(), ConfigError> {
    let mut keys = manager.discover_keys();
    keys.sort();
    if keys.is_empty() {
        println!("No private keys found in the SSH directory.");
    } else {
        println!("Discovered private keys:");
        for k in &keys {
            println!("  {}", k.display());
        }
    }

    match key {
        Some(path) => {
            manager.set_default_identity_file(&path)?;
            println!("Default key set to {path}");
        }
        None => println!("No default key configured; pass --key to set one."),
    }

    manager.refresh()?;
    manager.mark_initialized()?;
    println!(
        "Managed config installed at {}",
        manager.integration().managed_path().display()
    );
    Ok(())
}

fn print_profile(profile: &SshProfile) {
    println!("{:<14} {}", "name:", profile.name);
    println!("{:<14} {}", "host:", profile.host);
    if let Some(hostname) = &profile.hostname {
        println!("{:<14} {}", "hostname:", hostname);
    }
    println!("{:<14} {}", "user:", profile.user);
    println!("{:<14} {}", "port:", profile.port);
    if let Some(key) = &profile.identity_file {
        println!("{:<14} {}", "key:", key);
    }
    if let Some(proxy_jump) = &profile.proxy_jump {
        println!("{:<14} {}", "proxy jump:", proxy_jump);
    }
    if let Some(forward) = &profile.local_forward {
        println!("{:<14} {}", "local fwd:", forward);
    }
    if let Some(forward) = &profile.remote_forward {
        println!("{:<14} {}", "remote fwd:", forward);
    }
    if !profile.tags.is_empty() {
        println!("{:<14} {}", "tags:", profile.tags.join(", "));
    }
    if let Some(notes) = &profile.notes {
        println!("{:<14} {}", "notes:", notes);
    }
    println!("{:<14} {}", "created:", profile.created_at.to_rfc3339());
    match &profile.last_used {
        Some(t) => println!("{:<14} {} ({} uses)", "last used:", t.to_rfc3339(), profile.use_count),
        None => println!("{:<14} never", "last used:"),
    }
    println!();
    print!("{}", profile.to_config_block());
}

fn apply_optional(field: &mut Option<String>, flag: Option<String>) {
    if let Some(value) = flag {
        *field = if value.is_empty() { None } else { Some(value) };
    }
}

fn parse_extra_option(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((directive, value)) if !directive.trim().is_empty() && !value.trim().is_empty() => {
            Ok((directive.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(ConfigError::validation(
            "option",
            format!("'{raw}' must be in 'Name=Value' form"),
        )),
    }
}
