//! termlend CLI
//!
//! Runs solvency core operations against a JSON scenario file holding the
//! configuration, rates, market parameters, share prices, ledger and time.
//! Operations are dry runs unless `--commit` is given, in which case the
//! updated ledger is written back to the scenario.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use console::{style, Term};
use serde::{Deserialize, Serialize};

use termlend::core::config::ProtocolConfig;
use termlend::core::currency::CurrencyId;
use termlend::core::vault::VaultId;
use termlend::market::ConstantRateMarket;
use termlend::oracle::rate_oracle::StaticRateOracle;
use termlend::oracle::vault_shares::StaticShareValuation;
use termlend::protocol::core::SolvencyCore;
use termlend::storage::ledger::InMemoryLedger;
use termlend::utils::constants::RATIO_PRECISION;
use termlend::utils::crypto::AccountId;
use termlend::valuation::health::HealthFactors;

/// termlend - solvency core of a fixed-rate lending protocol
#[derive(Parser)]
#[command(name = "termlend")]
#[command(author = "termlend Team")]
#[command(version = termlend::VERSION)]
#[command(about = "Health checks, liquidation and nToken redemption against a scenario file", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the scenario file
    #[arg(short, long, env = "TERMLEND_SCENARIO", default_value = "scenario.json")]
    scenario: PathBuf,

    /// Apply the operation and write the updated scenario
    #[arg(long, global = true)]
    commit: bool,

    /// Write the updated scenario here instead of overwriting the input
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show health factors of an account or vault position
    Health {
        /// Account (hex)
        account: String,
        /// Vault id, for a vault position
        #[arg(long)]
        vault: Option<u32>,
    },

    /// Liquidate fCash in the account's local currency
    LiquidateLocal {
        /// Liquidator (hex)
        liquidator: String,
        /// Liquidated account (hex)
        account: String,
        /// Local currency id
        #[arg(long)]
        currency: u16,
        /// Maturities, strictly descending
        #[arg(long, value_delimiter = ',', required = true)]
        maturities: Vec<u64>,
        /// Max notional per maturity (0 = uncapped); defaults to all zero
        #[arg(long, value_delimiter = ',')]
        max_amounts: Vec<i128>,
    },

    /// Liquidate collateral fCash for local currency
    LiquidateCross {
        /// Liquidator (hex)
        liquidator: String,
        /// Liquidated account (hex)
        account: String,
        /// Currency paid by the liquidator
        #[arg(long)]
        local_currency: u16,
        /// Currency of the fCash taken
        #[arg(long)]
        fcash_currency: u16,
        /// Maturities, strictly descending
        #[arg(long, value_delimiter = ',', required = true)]
        maturities: Vec<u64>,
        /// Max notional per maturity (0 = uncapped); defaults to all zero
        #[arg(long, value_delimiter = ',')]
        max_amounts: Vec<i128>,
    },

    /// Deleverage a vault position
    Deleverage {
        /// Liquidator (hex)
        liquidator: String,
        /// Vault account (hex)
        account: String,
        /// Vault id
        #[arg(long)]
        vault: u32,
        /// Debt leg (0 = primary, 1/2 = secondary)
        #[arg(long, default_value_t = 0)]
        leg: u8,
        /// Max deposit in the leg's underlying (0 = uncapped)
        #[arg(long, default_value_t = 0)]
        cap: i128,
    },

    /// Redeem nToken shares
    Redeem {
        /// Redeemer (hex)
        account: String,
        /// Currency id
        #[arg(long)]
        currency: u16,
        /// Shares to redeem
        #[arg(long)]
        shares: i128,
        /// Keep withdrawn fCash instead of selling it
        #[arg(long)]
        keep_residuals: bool,
        /// Accept residual fCash into the portfolio
        #[arg(long)]
        accept_residuals: bool,
        /// Run as part of a batch (residuals are rejected)
        #[arg(long)]
        batched: bool,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIO
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the core needs, in one file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Scenario {
    #[serde(default)]
    config: ProtocolConfig,
    oracle: StaticRateOracle,
    #[serde(default)]
    market: ConstantRateMarket,
    #[serde(default)]
    share_prices: StaticShareValuation,
    #[serde(default)]
    ledger: InMemoryLedger,
    #[serde(default)]
    time: u64,
}

impl Scenario {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read scenario {}: {}", path.display(), e))?;
        let mut scenario: Scenario = serde_json::from_str(&content)?;
        scenario.config.apply_env_overrides()?;
        Ok(scenario)
    }

    fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn core(&self) -> anyhow::Result<SolvencyCore<InMemoryLedger>> {
        Ok(SolvencyCore::new(
            &self.config,
            self.ledger.clone(),
            Box::new(self.oracle.clone()),
            Box::new(self.market),
            Box::new(self.share_prices.clone()),
            self.time,
        )?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════════════════════

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let term = Term::stdout();

    if let Err(e) = run_command(&cli, &term) {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(cli: &Cli, term: &Term) -> anyhow::Result<()> {
    let mut scenario = Scenario::load(&cli.scenario)?;
    let mut core = scenario.core()?;

    if !cli.json {
        let _ = term.write_line(&format!(
            "{} {} as of {}",
            style("→").cyan(),
            cli.scenario.display(),
            format_time(scenario.time)
        ));
    }

    let mutated = match &cli.command {
        Commands::Health { account, vault } => {
            let account = parse_account(account)?;
            let factors = core.compute_health_factors(&account, vault.map(VaultId))?;
            print_health(cli, term, &factors, core.params().min_collateral_ratio)?;
            false
        }

        Commands::LiquidateLocal {
            liquidator,
            account,
            currency,
            maturities,
            max_amounts,
        } => {
            let (liquidator, account) = (parse_account(liquidator)?, parse_account(account)?);
            let caps = caps_for(maturities, max_amounts);
            if cli.commit {
                let receipt = core.liquidate_fcash_local(
                    &liquidator,
                    &account,
                    CurrencyId(*currency),
                    maturities,
                    &caps,
                )?;
                print_result(cli, term, "fCash liquidated", &receipt)?;
                true
            } else {
                let computed = core.calculate_fcash_local(
                    &liquidator,
                    &account,
                    CurrencyId(*currency),
                    maturities,
                    &caps,
                )?;
                print_result(cli, term, "Liquidation (dry run)", &computed)?;
                false
            }
        }

        Commands::LiquidateCross {
            liquidator,
            account,
            local_currency,
            fcash_currency,
            maturities,
            max_amounts,
        } => {
            let (liquidator, account) = (parse_account(liquidator)?, parse_account(account)?);
            let caps = caps_for(maturities, max_amounts);
            if cli.commit {
                let receipt = core.liquidate_fcash_cross_currency(
                    &liquidator,
                    &account,
                    CurrencyId(*local_currency),
                    CurrencyId(*fcash_currency),
                    maturities,
                    &caps,
                )?;
                print_result(cli, term, "fCash liquidated", &receipt)?;
                true
            } else {
                let computed = core.calculate_fcash_cross_currency(
                    &liquidator,
                    &account,
                    CurrencyId(*local_currency),
                    CurrencyId(*fcash_currency),
                    maturities,
                    &caps,
                )?;
                print_result(cli, term, "Liquidation (dry run)", &computed)?;
                false
            }
        }

        Commands::Deleverage {
            liquidator,
            account,
            vault,
            leg,
            cap,
        } => {
            let (liquidator, account) = (parse_account(liquidator)?, parse_account(account)?);
            if cli.commit {
                let receipt =
                    core.deleverage_vault_account(&liquidator, &account, VaultId(*vault), *leg, *cap)?;
                print_result(cli, term, "Vault position deleveraged", &receipt)?;
                true
            } else {
                let computed =
                    core.calculate_deleverage(&liquidator, &account, VaultId(*vault), *leg, *cap)?;
                print_result(cli, term, "Deleverage (dry run)", &computed)?;
                false
            }
        }

        Commands::Redeem {
            account,
            currency,
            shares,
            keep_residuals,
            accept_residuals,
            batched,
        } => {
            let account = parse_account(account)?;
            // Runs against the in-memory copy; only --commit writes it back
            let redemption = if *batched {
                core.redeem_ntoken_batched(&account, CurrencyId(*currency), *shares)?
            } else {
                core.redeem_ntoken(
                    &account,
                    CurrencyId(*currency),
                    *shares,
                    !*keep_residuals,
                    *accept_residuals,
                )?
            };
            let title = if cli.commit { "nToken redeemed" } else { "Redemption (dry run)" };
            print_result(cli, term, title, &redemption)?;
            cli.commit
        }
    };

    if mutated {
        for event in core.events().events() {
            tracing::info!(event = event.event_type(), hash = %event.hash(), "event emitted");
        }
        scenario.ledger = core.into_ledger();
        let path = cli.output.as_deref().unwrap_or(&cli.scenario);
        scenario.save(path)?;
        if !cli.json {
            let _ = term.write_line(&format!(
                "{} Scenario written to {}",
                style("✓").green(),
                path.display()
            ));
        }
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn parse_account(s: &str) -> anyhow::Result<AccountId> {
    AccountId::from_hex(s.trim_start_matches("0x"))
        .map_err(|e| anyhow::anyhow!("Invalid account {}: {}", s, e))
}

fn caps_for(maturities: &[u64], max_amounts: &[i128]) -> Vec<i128> {
    if max_amounts.is_empty() {
        vec![0; maturities.len()]
    } else {
        max_amounts.to_vec()
    }
}

fn format_time(time: u64) -> String {
    i64::try_from(time)
        .ok()
        .and_then(|secs| chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0))
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| time.to_string())
}

fn format_ratio(ratio: i128) -> String {
    if ratio == i128::MAX {
        return "∞".into();
    }
    let basis = ratio.saturating_mul(10_000) / RATIO_PRECISION;
    format!("{}.{:02}%", basis / 100, (basis % 100).abs())
}

fn print_health(cli: &Cli, term: &Term, factors: &HealthFactors, min_ratio: i128) -> anyhow::Result<()> {
    if cli.json {
        let _ = term.write_line(&serde_json::to_string_pretty(factors)?);
        return Ok(());
    }

    let ratio = format_ratio(factors.collateral_ratio);
    let ratio = if factors.is_below(min_ratio) {
        style(ratio).red().bold()
    } else {
        style(ratio).green()
    };
    let _ = term.write_line(&format!("  Collateral ratio:  {:>24}", ratio));
    let _ = term.write_line(&format!("  Minimum:           {:>24}", format_ratio(min_ratio)));
    let _ = term.write_line(&format!("  Collateral value:  {:>24}", factors.collateral_value));
    let _ = term.write_line(&format!("  Debt value:        {:>24}", factors.debt_value));
    for (currency, rate) in &factors.exchange_rates {
        let _ = term.write_line(&format!("  Rate {:<13} {:>24}", currency, rate));
    }
    Ok(())
}

fn print_result<T: Serialize>(cli: &Cli, term: &Term, title: &str, value: &T) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    if !cli.json {
        let _ = term.write_line(&format!("{} {}", style("✓").green(), style(title).bold()));
    }
    let _ = term.write_line(&body);
    Ok(())
}
