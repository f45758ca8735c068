use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "conductor", about = "Bare-metal node lifecycle conductor", version)]
pub struct Cli {
    /// Talk to a remote conductor API instead of the local default.
    #[arg(long, env = "CONDUCTOR_URL", global = true)]
    pub remote: Option<String>,

    /// Bearer token for the operator API. Falls back to the token file
    /// written by `conductor serve`.
    #[arg(long, env = "CONDUCTOR_TOKEN", global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the conductor process: REST API plus the periodic loops
    /// (heartbeat, power sync, deploy-timeout sweep).
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        #[arg(long, default_value_t = 6385)]
        port: u16,

        /// This process's identity in the consistent-hash ring. Defaults to
        /// the machine hostname.
        #[arg(long)]
        hostname: Option<String>,

        /// `conductor_group`s this process serves. Repeatable; defaults to
        /// the default group (empty string).
        #[arg(long = "conductor-group")]
        conductor_groups: Vec<String>,

        /// Generate a fresh token even if one already exists on disk.
        #[arg(long)]
        rotate_token: bool,
    },

    /// Node lifecycle operations (spec.md §6 REST surface).
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// Driver-scoped vendor passthru.
    Driver {
        #[command(subcommand)]
        command: DriverCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum NodeCommand {
    /// List nodes, with optional filtering/sorting/pagination.
    List {
        #[arg(long)]
        marker: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        sort_key: Option<String>,
        #[arg(long)]
        sort_dir: Option<String>,
        #[arg(long)]
        instance_uuid: Option<String>,
        #[arg(long)]
        associated: Option<bool>,
        #[arg(long)]
        maintenance: Option<bool>,
    },

    /// Show one node.
    Show { uuid: String },

    /// Create a node.
    Create {
        #[arg(long)]
        driver: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "conductor-group", default_value = "")]
        conductor_group: String,
        /// JSON object, or `@path` to read it from a file.
        #[arg(long)]
        driver_info: Option<String>,
        #[arg(long)]
        properties: Option<String>,
        #[arg(long)]
        instance_info: Option<String>,
    },

    /// Apply a JSON-Patch (RFC 6902) document to a node's public fields.
    Patch {
        uuid: String,
        /// JSON-Patch array, or `@path` to read it from a file.
        patch: String,
    },

    /// Delete a node. Requires the node be unassociated and powered off.
    Delete { uuid: String },

    /// Show a node's power/provision state.
    States { uuid: String },

    /// Request a power transition.
    Power { uuid: String, target: PowerTargetArg },

    /// Request a provisioning transition (deploy or tear down).
    Provision { uuid: String, target: ProvisionTargetArg },

    /// Fetch console connection info.
    ConsoleShow { uuid: String },

    /// Enable or disable the console.
    ConsoleSet {
        uuid: String,
        #[arg(long)]
        enabled: bool,
    },

    /// Invoke a node-scoped vendor passthru method.
    VendorPassthru {
        uuid: String,
        method: String,
        /// JSON object, or `@path` to read it from a file.
        info: String,
    },

    /// Validate a node's driver interfaces.
    Validate { uuid: String },
}

#[derive(Debug, Subcommand)]
pub enum DriverCommand {
    /// Invoke a driver-scoped (not node-scoped) vendor passthru method.
    VendorPassthru {
        driver: String,
        method: String,
        /// JSON object, or `@path` to read it from a file.
        info: String,
    },
}

#[derive(Debug, Clone, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum PowerTargetArg {
    On,
    Off,
    Reboot,
}

#[derive(Debug, Clone, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum ProvisionTargetArg {
    Active,
    Deleted,
}
