use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use tlfmd_crypto::SigningKey;
use tlfmd_metadata::{Blake3Crypto, CryptoPure, ExtraMetadata, RootMetadata, SignedMetadata};
use tlfmd_server::{StorageConfig, TlfStorage, VerifyReport};
use tlfmd_types::{BranchId, MdId, ReaderBundleId, Revision, TlfId, UserId, WriterBundleId};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let storage = open_storage(&cli)?;
    let format = cli.format;
    let result = match cli.command {
        Command::Head(args) => cmd_head(&storage, args, &format),
        Command::Range(args) => cmd_range(&storage, args, &format),
        Command::Bundles(args) => cmd_bundles(&storage, args, &format),
        Command::Verify(_) => cmd_verify(&storage),
        Command::Reset(args) => cmd_reset(&storage, args),
    };
    storage.shutdown();
    result
}

fn open_storage(cli: &Cli) -> anyhow::Result<TlfStorage> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::load(path)?,
        None => StorageConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    let tlf = cli.tlf.as_deref().context("--tlf is required")?;
    let tlf = TlfId::from_hex(tlf).context("invalid --tlf")?;
    Ok(TlfStorage::open(tlf, config)?)
}

fn parse_branch(branch: Option<&str>) -> anyhow::Result<BranchId> {
    match branch {
        Some(hex) => BranchId::from_hex(hex).context("invalid --branch"),
        None => Ok(BranchId::NULL),
    }
}

fn md_id(rmds: &SignedMetadata) -> anyhow::Result<MdId> {
    Ok(Blake3Crypto.make_md_id(rmds.md())?)
}

fn print_rmds(rmds: &SignedMetadata, format: &OutputFormat) -> anyhow::Result<()> {
    let id = md_id(rmds)?;
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({ "id": id.to_hex(), "metadata": rmds });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            let md = rmds.md();
            println!(
                "{}  {}  ({} {})",
                format!("rev {}", md.revision()).yellow().bold(),
                id.hash().short_hex().dimmed(),
                md.merge_status(),
                md.bid().to_string().cyan()
            );
            println!("  Prev root: {}", md.prev_root.hash().short_hex());
            println!(
                "  Last modified by: {} (writer {})",
                md.last_modifying_user, md.writer.last_modifying_writer
            );
            println!(
                "  Disk usage: {} (+{} -{})",
                md.writer.disk_usage, md.writer.ref_bytes, md.writer.unref_bytes
            );
            if md.is_public() {
                println!("  Key bundles: {}", "none (public)".green());
            } else {
                println!(
                    "  Key bundles: writer {} reader {}",
                    md.writer_bundle_id().hash().short_hex(),
                    md.reader_bundle_id().hash().short_hex()
                );
            }
        }
    }
    Ok(())
}

fn cmd_head(storage: &TlfStorage, args: HeadArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let user = UserId::derive(&args.user);
    let branch = parse_branch(args.branch.as_deref())?;
    match storage.get_head(user, branch)? {
        Some(rmds) => print_rmds(&rmds, format),
        None => {
            println!("Branch {} has no revisions.", branch.to_string().cyan());
            Ok(())
        }
    }
}

fn cmd_range(storage: &TlfStorage, args: RangeArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let user = UserId::derive(&args.user);
    let branch = parse_branch(args.branch.as_deref())?;
    let revisions = storage.get_range(
        user,
        branch,
        Revision::new(args.start),
        Revision::new(args.stop),
    )?;
    if revisions.is_empty() {
        println!("No revisions in range.");
    }
    for rmds in &revisions {
        print_rmds(rmds, format)?;
    }
    Ok(())
}

fn cmd_bundles(storage: &TlfStorage, args: BundlesArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let wkb = WriterBundleId::from_hex(&args.writer).context("invalid --writer")?;
    let rkb = ReaderBundleId::from_hex(&args.reader).context("invalid --reader")?;
    let Some(extra) = storage.get_key_bundles(&wkb, &rkb)? else {
        println!("No key bundles referenced.");
        return Ok(());
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&extra)?),
        OutputFormat::Text => print_bundles(&extra),
    }
    Ok(())
}

fn print_bundles(extra: &ExtraMetadata) {
    let pair = extra.bundles();
    println!("Format: {}", extra.metadata_ver().to_string().cyan());
    println!("{}", "Writers:".bold());
    for (user, keys) in &pair.writer.keys {
        println!("  {user}  {} device(s)", keys.len());
    }
    println!("{}", "Readers:".bold());
    for (user, keys) in &pair.reader.keys {
        println!("  {user}  {} device(s)", keys.len());
    }
}

fn cmd_verify(storage: &TlfStorage) -> anyhow::Result<()> {
    let report = storage.verify()?;
    print_report(&report);
    if !report.is_valid() {
        bail!("{} violation(s) found", report.violation_count());
    }
    Ok(())
}

fn print_report(report: &VerifyReport) {
    if report.branches.is_empty() {
        println!("No branches.");
        return;
    }
    for branch in &report.branches {
        let name = if branch.branch.is_null() {
            "merged".to_string()
        } else {
            branch.branch.to_string()
        };
        let span = match (branch.earliest, branch.latest) {
            (Some(first), Some(last)) => format!("revs {first}..={last}"),
            _ => "empty".to_string(),
        };
        if branch.is_valid() {
            println!("{} {} ({span})", "✓".green().bold(), name.cyan());
        } else {
            println!("{} {} ({span})", "✗".red().bold(), name.cyan());
            for v in &branch.violations {
                println!("  rev {}: {} {}", v.revision, v.kind.to_string().red(), v.description);
            }
        }
    }
}

fn cmd_reset(storage: &TlfStorage, args: ResetArgs) -> anyhow::Result<()> {
    let user = UserId::derive(&args.user);
    let key = load_signing_key(&args.key_file)?;
    let ResetPlan { head, next: rmds } = plan_reset(storage, user, &key)?;

    println!("{} {}", "Reset will write".bold(), format!("rev {}", rmds.revision()).yellow());
    println!("  Private data: {}", "cleared".red());
    println!(
        "  Disk usage: {} -> {}",
        head.md().writer.disk_usage,
        rmds.md().writer.disk_usage
    );

    if args.dry_run {
        println!("Dry run; nothing written.");
        return Ok(());
    }
    if !args.force && !confirm("Reset this folder? [y/N] ")? {
        println!("Aborted.");
        return Ok(());
    }

    storage.put(user, &key.verifying_key(), &rmds, None)?;
    println!("{} Folder reset at rev {}", "✓".green().bold(), rmds.revision());
    Ok(())
}

/// The merged head being reset and the signed revision that replaces it.
#[derive(Debug)]
struct ResetPlan {
    head: SignedMetadata,
    next: SignedMetadata,
}

/// Build and sign the reset revision for `user`, refusing if the user still
/// has unmerged work.
fn plan_reset(storage: &TlfStorage, user: UserId, key: &SigningKey) -> anyhow::Result<ResetPlan> {
    for branch in storage.branches()? {
        if branch.is_null() {
            continue;
        }
        let Some(head) = storage.get_head(user, branch)? else {
            continue;
        };
        if head.md().last_modifying_user == user {
            bail!("unmerged branch {branch} exists; resolve it before resetting");
        }
    }

    let head = storage
        .get_head(user, BranchId::NULL)?
        .context("folder has no merged history to reset")?;
    let md = reset_successor(head.md(), md_id(&head)?, user);
    let next = SignedMetadata::sign(md, key)?;
    Ok(ResetPlan { head, next })
}

/// The successor of `prev` that drops every file: private data is cleared
/// and all previously referenced bytes are unreferenced.
fn reset_successor(prev: &RootMetadata, prev_id: MdId, user: UserId) -> RootMetadata {
    let mut md = prev.make_successor(prev_id);
    md.writer.serialized_private_data.clear();
    md.writer.unref_bytes = prev.writer.disk_usage;
    md.writer.disk_usage = 0;
    md.writer.last_modifying_writer = user;
    md.last_modifying_user = user;
    md
}

fn load_signing_key(path: &Path) -> anyhow::Result<SigningKey> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read key file {}", path.display()))?;
    SigningKey::from_hex(&text).with_context(|| format!("bad key file {}", path.display()))
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
