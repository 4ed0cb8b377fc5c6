use std::error::Error;
use std::path::Path;
use std::thread;
use std::time::Duration;

use traj_core::naming::{join, leaf_of};
use traj_core::{values, ExplorationPlan, Node, RunOutput, RunView, Tree, Value};
use traj_runner::{Coordinator, ExecutionMode, HookAction, RunFailure, RunnerConfig};
use traj_store::{export as export_table, merge_files, ExportFormat, LoadMode, StorageService};

use crate::{DemoArgs, InspectArgs};

type CommandResult = Result<(), Box<dyn Error>>;

pub(crate) fn demo(args: &DemoArgs) -> CommandResult {
    let store = StorageService::open(&args.store)?;
    let mut config = match &args.config {
        Some(path) => RunnerConfig::from_json_file(path)?,
        None => RunnerConfig::default().with_progress(true),
    };
    if let Some(workers) = args.workers {
        config.mode = ExecutionMode::pooled(workers);
    }

    let mut tree = Tree::new("demo");
    tree.add_parameter("x", 1)?;
    tree.add_parameter("y", 1)?;
    tree.explore(&ExplorationPlan::cartesian([
        ("x", values(args.xs.iter().copied())),
        ("y", values(args.ys.iter().copied())),
    ])?)?;

    let delay = Duration::from_millis(args.delay_ms);
    let fail_run = args.fail_run;
    let simulate = move |view: &mut RunView| -> Result<(), RunFailure> {
        if fail_run == Some(view.run()) {
            return Err(RunFailure::new("failure requested with --fail-run"));
        }
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let x = view
            .parameter("x")?
            .as_i64()
            .ok_or_else(|| RunFailure::new("x must be an integer"))?;
        let y = view
            .parameter("y")?
            .as_i64()
            .ok_or_else(|| RunFailure::new("y must be an integer"))?;
        view.add_result_value("z", x * y)?;
        Ok(())
    };

    let mut coordinator = Coordinator::new(&store, config);
    if let Some(limit) = args.stop_after {
        let mut seen = 0;
        coordinator = coordinator.with_hook(move |_: &mut Tree, _: &RunOutput| {
            seen += 1;
            Ok(if seen >= limit {
                HookAction::Stop
            } else {
                HookAction::Continue
            })
        });
    }
    let report = coordinator.run(&mut tree, simulate)?;

    println!(
        "executed {}, skipped {}, failed {}, pending {}",
        report.executed.len(),
        report.skipped.len(),
        report.failed.len(),
        report.pending_runs().len()
    );
    for error in &report.failed {
        println!("  {error}");
    }

    store.resolve_all(&mut tree, "runs")?;
    println!("{:>6} {:>6} {:>6} {:>8}", "run", "x", "y", "z");
    for &run in tree.completed_runs() {
        let binding = tree.bindings(run)?;
        let cell = |value: Option<&Value>| {
            value.map(ToString::to_string).unwrap_or_else(|| "-".to_string())
        };
        println!(
            "{:>6} {:>6} {:>6} {:>8}",
            run,
            cell(binding.get("x")),
            cell(binding.get("y")),
            cell(tree.run_value(run, "z", "z"))
        );
    }

    if let Some(path) = &args.export {
        let format = ExportFormat::from_path(path).unwrap_or(ExportFormat::Parquet);
        export_table(&tree, path, format)?;
        println!("exported {} runs to {}", tree.completed_runs().len(), path.display());
    }
    Ok(())
}

pub(crate) fn inspect(args: &InspectArgs) -> CommandResult {
    let store = StorageService::open(&args.store)?;
    let mut tree = store.open_tree(LoadMode::Lazy)?;

    println!("tree        {}", tree.name());
    println!(
        "runs        {} of {} committed",
        store.list_completed_runs()?.len(),
        tree.run_count()
    );
    let attempts = store.open_attempts()?;
    if !attempts.is_empty() {
        println!("interrupted {attempts:?}");
    }
    for (run, error) in store.failures()? {
        println!("failed      run {run}: {error}");
    }

    println!("parameters");
    for (path, parameter) in tree.parameters() {
        match parameter.explored() {
            Some(explored) => println!(
                "  {path} = {} (explored, {} values)",
                parameter.default_value(),
                explored.len()
            ),
            None => println!("  {path} = {}", parameter.default_value()),
        }
    }
    let aggregates = tree.aggregate_results();
    if !aggregates.is_empty() {
        println!("results");
        for (path, result) in aggregates {
            let items: Vec<&str> = result.items().keys().map(String::as_str).collect();
            println!("  {path} [{}]", items.join(", "));
        }
    }

    if args.runs {
        store.resolve_all(&mut tree, "runs")?;
        for &run in tree.completed_runs() {
            let binding = tree.bindings(run)?;
            let bound: Vec<String> = binding
                .iter()
                .map(|(path, value)| format!("{}={value}", leaf_of(path)))
                .collect();
            println!("{} ({})", tree.run_name(run), bound.join(", "));
            for (path, result) in tree.run_results(run) {
                for (item, value) in result.loaded_values() {
                    println!("  {} = {value}", join(path, &item));
                }
            }
        }
    }

    if let Some(shorthand) = &args.get {
        print_node(&store, &mut tree, shorthand, args.item.as_deref())?;
    }
    Ok(())
}

fn print_node(
    store: &StorageService,
    tree: &mut Tree,
    shorthand: &str,
    item: Option<&str>,
) -> CommandResult {
    let (path, items) = {
        let handle = tree.get(shorthand)?;
        match handle.node() {
            Node::Parameter(parameter) => {
                println!("{} = {}", handle.path(), parameter.default_value());
                return Ok(());
            }
            Node::Group(group) => {
                println!("{} (group)", handle.path());
                for child in group.children() {
                    println!("  {child}");
                }
                return Ok(());
            }
            Node::Result(result) => {
                let items: Vec<String> = match item {
                    Some(item) => vec![item.to_string()],
                    None => result.items().keys().cloned().collect(),
                };
                (handle.path().to_string(), items)
            }
        }
    };
    for item in items {
        let value = store.resolve(tree, &path, &item)?;
        println!("{} = {value}", join(&path, &item));
    }
    Ok(())
}

pub(crate) fn merge(first: &Path, second: &Path, out: &Path) -> CommandResult {
    let merged = merge_files(first, second, out)?;
    println!(
        "merged into {} ({} committed runs)",
        out.display(),
        merged.list_completed_runs()?.len()
    );
    Ok(())
}

pub(crate) fn export(store: &Path, output: &Path, format: Option<ExportFormat>) -> CommandResult {
    let format = format
        .or_else(|| ExportFormat::from_path(output))
        .ok_or("cannot infer the export format; pass --format")?;
    let tree = StorageService::open(store)?.open_tree(LoadMode::Eager)?;
    export_table(&tree, output, format)?;
    println!(
        "exported {} runs to {}",
        tree.completed_runs().len(),
        output.display()
    );
    Ok(())
}

pub(crate) fn compact(store: &Path) -> CommandResult {
    let stats = StorageService::open(store)?.compact()?;
    println!(
        "compacted {}: {} -> {} bytes",
        store.display(),
        stats.bytes_before,
        stats.bytes_after
    );
    Ok(())
}
