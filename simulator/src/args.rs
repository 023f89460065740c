use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Deterministic keyed-pool simulator")]
pub(crate) struct Args {
    /// Stop once this much simulated time has passed.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) duration: Option<Duration>,
    #[arg(long)]
    pub(crate) iterations: Option<u64>,
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    #[arg(long, default_value_t = 8)]
    pub(crate) max_conn: usize,
    #[arg(long, default_value_t = 16)]
    pub(crate) tasks: usize,
    #[arg(long, default_value_t = 2)]
    pub(crate) expiration_secs: u64,
    #[arg(long, default_value_t = 0.2)]
    pub(crate) named_key_rate: f64,
    #[arg(long, default_value_t = 0.01)]
    pub(crate) fault_rate: f64,
    #[arg(long, default_value_t = 0.01)]
    pub(crate) connect_fail_rate: f64,
    #[arg(long, default_value_t = 0.05)]
    pub(crate) sleep_rate: f64,
    #[arg(long, default_value_t = 0.02)]
    pub(crate) purge_rate: f64,
    #[arg(long)]
    pub(crate) disable_pooling: bool,
    #[arg(long)]
    pub(crate) log: Option<PathBuf>,
    #[arg(long)]
    pub(crate) quick: bool,
    #[arg(long)]
    pub(crate) stress: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimConfig {
    pub(crate) duration_ms: Option<u64>,
    pub(crate) iterations: Option<u64>,
    pub(crate) seed: u64,
    pub(crate) max_conn: usize,
    pub(crate) tasks: usize,
    pub(crate) expiration_secs: u64,
    pub(crate) named_key_rate: f64,
    pub(crate) fault_rate: f64,
    pub(crate) connect_fail_rate: f64,
    pub(crate) sleep_rate: f64,
    pub(crate) purge_rate: f64,
    pub(crate) disable_pooling: bool,
    pub(crate) log: Option<PathBuf>,
    pub(crate) preset: Option<String>,
    pub(crate) first_steps: usize,
    pub(crate) tail_steps: usize,
}

impl SimConfig {
    pub(crate) fn from_args(args: Args) -> Self {
        let mut config = SimConfig {
            duration_ms: args.duration.map(|d| d.as_millis() as u64),
            iterations: args.iterations,
            seed: args.seed.unwrap_or_else(random_seed),
            max_conn: args.max_conn.max(1),
            tasks: args.tasks.max(1),
            expiration_secs: args.expiration_secs,
            named_key_rate: clamp_rate(args.named_key_rate),
            fault_rate: clamp_rate(args.fault_rate),
            connect_fail_rate: clamp_rate(args.connect_fail_rate),
            sleep_rate: clamp_rate(args.sleep_rate),
            purge_rate: clamp_rate(args.purge_rate),
            disable_pooling: args.disable_pooling,
            log: args.log,
            preset: None,
            first_steps: 30,
            tail_steps: 80,
        };

        if args.quick {
            config.apply_quick();
        }
        if args.stress {
            config.apply_stress();
        }

        config
    }

    fn apply_quick(&mut self) {
        self.preset = Some("quick".to_string());
        self.iterations = Some(10_000);
        self.duration_ms = None;
        self.max_conn = 4;
        self.tasks = 6;
        self.fault_rate = 0.01;
        self.connect_fail_rate = 0.01;
        self.sleep_rate = 0.05;
    }

    fn apply_stress(&mut self) {
        self.preset = Some("stress".to_string());
        self.iterations = Some(250_000);
        self.duration_ms = None;
        self.max_conn = 16;
        self.tasks = 64;
        self.fault_rate = 0.03;
        self.connect_fail_rate = 0.02;
        self.sleep_rate = 0.08;
        self.purge_rate = 0.05;
    }
}

fn clamp_rate(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

fn random_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    now.as_secs() ^ u64::from(now.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_rate_limits_bounds() {
        assert_eq!(clamp_rate(-1.0), 0.0);
        assert_eq!(clamp_rate(2.0), 1.0);
        assert_eq!(clamp_rate(0.5), 0.5);
        assert_eq!(clamp_rate(f64::NAN), 0.0);
    }

    #[test]
    fn quick_preset_overrides_sizes() {
        let args = Args::parse_from(["simulator", "--quick", "--seed", "7", "--max-conn", "99"]);
        let config = SimConfig::from_args(args);
        assert_eq!(config.seed, 7);
        assert_eq!(config.max_conn, 4);
        assert_eq!(config.iterations, Some(10_000));
        assert_eq!(config.preset.as_deref(), Some("quick"));
    }
}
