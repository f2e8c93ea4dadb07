//! Display of trace profiles on standard output

use crate::{
    duration::{self, display_duration, Duration},
    profile, CliArgs, ToolError,
};
use log::debug;
use serde_json as json;
use std::{
    borrow::Cow,
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};
use termtree::{GlyphPalette, Tree};
use trace_tree::{serialization, AggregateNodeRef, AggregateTree, EventTree};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Glyphs used to draw hierarchical profiles
const PALETTE: GlyphPalette = GlyphPalette {
    middle_item: "├",
    last_item: "└",
    item_indent: "─",
    middle_skip: "│",
    last_skip: " ",
    skip_indent: " ",
};

/// Run the analysis and display the results on stdout
pub fn run(args: CliArgs) -> Result<(), ToolError> {
    // Determine column budget
    let max_cols = termion::terminal_size()
        .map(|(width, _height)| width.min(args.max_cols))
        .unwrap_or(args.max_cols);

    // Load the trace and rebuild its trees
    eprintln!("Processing input data...");
    let file = File::open(&args.input).map_err(|source| ToolError::Open {
        path: args.input.clone(),
        source,
    })?;
    let collection = serialization::read(file)?;
    let event_tree = EventTree::new(&collection, None);
    let mut aggregate = AggregateTree::new();
    aggregate.append(&event_tree, &collection);
    debug!(
        "Loaded {} threads, {} counters and {} markers",
        aggregate.root().num_children(),
        event_tree.counters().len(),
        event_tree.markers().len()
    );
    if let Some(path) = &args.chrome {
        export_chrome_trace(&event_tree, path)?;
    }

    // Display basic metadata
    let mut output = io::stdout().lock();
    writeln!(
        output,
        "Data from {} ({} threads)",
        args.input.display(),
        aggregate.root().num_children()
    )?;

    // Use the total duration of all threads as a duration norm
    let duration_norm = profile::duration_norm(aggregate.root().children());

    print_scope_name_profile(
        &mut output,
        &aggregate,
        duration_norm,
        args.self_threshold as Duration / 100.0,
        max_cols,
    )?;
    let hierarchy = HierarchyConfig {
        duration_norm,
        threshold: args.hierarchical_threshold as Duration / 100.0,
        max_depth: args.max_depth,
    };
    print_hierarchical_profile(&mut output, &aggregate, &hierarchy, max_cols)?;
    print_counters(&mut output, &aggregate)?;
    print_markers(&mut output, &event_tree)?;
    Ok(())
}

/// Write the scopes of an event tree to a Chrome trace file
fn export_chrome_trace(event_tree: &EventTree, path: &Path) -> Result<(), ToolError> {
    let export_error = |source| ToolError::Export {
        path: path.to_owned(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(export_error)?);
    json::to_writer(&mut writer, &event_tree.to_chrome_trace())
        .map_err(|e| export_error(e.into()))?;
    writer.flush().map_err(export_error)
}

/// Display the exclusive duration of scopes, summed by name
fn print_scope_name_profile(
    mut output: impl io::Write,
    aggregate: &AggregateTree,
    duration_norm: Duration,
    threshold: Duration,
    max_cols: u16,
) -> io::Result<()> {
    writeln!(output, "\nExclusive duration breakdown by scope name:")?;
    let breakdown = profile::scope_name_breakdown(aggregate);
    let mut num_displayed = 0;
    for (key, duration) in breakdown.iter() {
        if duration * duration_norm < threshold {
            break;
        }
        let name_cols = usize::from(max_cols.saturating_sub(2));
        write!(output, "- ")?;
        display_named_duration(&mut output, key.as_str(), name_cols, *duration, duration_norm)?;
        writeln!(output)?;
        num_displayed += 1;
    }
    if num_displayed < breakdown.len() {
        writeln!(
            output,
            "- ... and {} other scope name(s) below {:.2}% ...",
            breakdown.len() - num_displayed,
            threshold * 100.0
        )?;
    }
    Ok(())
}

/// Tuning of the hierarchical profile display
struct HierarchyConfig {
    /// Factor that turns durations into fractions of the total duration
    duration_norm: Duration,

    /// Fraction of the total duration below which scopes are not displayed
    threshold: Duration,

    /// Maximal number of scope levels below each thread
    max_depth: Option<usize>,
}

/// Display the hierarchical profile of each thread
fn print_hierarchical_profile(
    mut output: impl io::Write,
    aggregate: &AggregateTree,
    config: &HierarchyConfig,
    max_cols: u16,
) -> io::Result<()> {
    writeln!(output, "\nHierarchical profile:")?;
    for thread in aggregate.root().children() {
        write!(
            output,
            "{}",
            hierarchical_profile_tree(thread, config, 0, max_cols)?
        )?;
    }
    Ok(())
}

/// Make a tree display of the hierarchical profile below some node
fn hierarchical_profile_tree(
    node: AggregateNodeRef,
    config: &HierarchyConfig,
    depth: usize,
    max_cols: u16,
) -> io::Result<Tree<Box<str>>> {
    // Render current node
    let mut node_display = Vec::<u8>::new();
    display_node(&mut node_display, &node, max_cols, config.duration_norm)?;
    let node_display: Box<str> = String::from_utf8_lossy(&node_display).into();
    let tree = Tree::new(node_display).with_glyphs(PALETTE);

    // Stop recursion when there is no space to render children
    let child_cols = max_cols
        .saturating_sub(PALETTE.middle_item.width() as u16)
        .saturating_sub(PALETTE.item_indent.width() as u16);
    let num_children = node.num_children();
    if child_cols == 0 || num_children == 0 {
        return Ok(tree);
    }
    let terminator = |mut message: String| {
        if message.width() > child_cols.into() {
            message.clear();
            message.push('…');
        }
        Tree::new(message.into_boxed_str()).with_glyphs(PALETTE)
    };
    if config.max_depth == Some(depth) {
        return Ok(tree.with_leaves(std::iter::once(terminator(format!(
            "…{num_children} nested scope(s)…"
        )))));
    }

    // Collect and render hottest children
    let hottest = profile::hottest_nodes(
        node.children(),
        |child| duration::from_ticks(child.inclusive_time()) * config.duration_norm,
        config.threshold,
    );
    let num_hottest = hottest.len();
    let mut leaves = hottest
        .iter()
        .map(|&child| hierarchical_profile_tree(child, config, depth + 1, child_cols))
        .collect::<io::Result<Vec<_>>>()?;

    // If there are more children, warn about it
    if num_hottest < num_children {
        leaves.push(terminator(format!(
            "…{} scope(s) below {:.2}%…",
            num_children - num_hottest,
            config.threshold * 100.0
        )));
    }
    Ok(tree.with_leaves(leaves))
}

/// Display an aggregate node along with its profiling information
fn display_node(
    output: impl io::Write,
    node: &AggregateNodeRef,
    max_cols: u16,
    duration_norm: Duration,
) -> io::Result<()> {
    let name = if node.count() > 1 {
        Cow::Owned(format!("{} ×{}", node.key(), node.count()))
    } else {
        Cow::Borrowed(node.key().as_str())
    };
    display_named_duration(
        output,
        &name,
        max_cols.into(),
        duration::from_ticks(node.inclusive_time()),
        duration_norm,
    )
}

/// Display a name followed by profiling information, within a column budget
fn display_named_duration(
    mut output: impl io::Write,
    name: &str,
    max_cols: usize,
    duration: Duration,
    duration_norm: Duration,
) -> io::Result<()> {
    // Display the trailing profiling numbers in a private string to know its
    // display width and how many columns that leaves for the name.
    let mut trailer = Vec::<u8>::new();
    display_profile_info(&mut trailer, duration, duration_norm)?;
    let trailer = String::from_utf8_lossy(&trailer);
    match max_cols.checked_sub(trailer.width()) {
        Some(name_cols) if name_cols > 0 => {
            write!(output, "{}{trailer}", truncate_name(name, name_cols))
        }
        // Not enough space for both, display the name alone
        _ => write!(output, "{}", truncate_name(name, max_cols)),
    }
}

/// Display profiling information (absolute and relative duration)
fn display_profile_info(
    mut output: impl io::Write,
    duration: Duration,
    duration_norm: Duration,
) -> io::Result<()> {
    write!(output, " [")?;
    display_duration(&mut output, duration)?;
    let percent = duration * duration_norm * 100.0;
    write!(output, ", {percent:.2}%]")
}

/// Truncate a name so that it only eats up `max_cols` columns, by eating up
/// the middle
fn truncate_name(name: &str, max_cols: usize) -> Cow<str> {
    if name.width() <= max_cols {
        return Cow::Borrowed(name);
    }
    if max_cols == 0 {
        return Cow::Borrowed("");
    }

    // Split our column budget into a header and trailer
    let trailer_cols = (max_cols - 1) / 2;
    let header_cols = max_cols - 1 - trailer_cols;
    let take_cols = |budget: usize, chars: &mut dyn Iterator<Item = char>| {
        let mut cols = 0;
        chars
            .take_while(|c| {
                cols += c.width().unwrap_or(0);
                cols <= budget
            })
            .collect::<Vec<_>>()
    };
    let header = take_cols(header_cols, &mut name.chars());
    let mut trailer = take_cols(trailer_cols, &mut name.chars().rev());
    trailer.reverse();

    let mut result = header.into_iter().collect::<String>();
    result.push('…');
    result.extend(trailer);
    Cow::Owned(result)
}

/// Display the final counter values and the scopes which affected them
fn print_counters(mut output: impl io::Write, aggregate: &AggregateTree) -> io::Result<()> {
    if aggregate.counters().is_empty() {
        return Ok(());
    }
    writeln!(output, "\nCounters:")?;
    let nodes = aggregate
        .root()
        .children()
        .chain(profile::all_scopes(aggregate))
        .collect::<Vec<_>>();
    for (&key, &total) in aggregate.counters() {
        writeln!(output, "- {key}: {total}")?;
        let Some(index) = aggregate.counter_index(key) else {
            continue;
        };
        let mut contributors = nodes
            .iter()
            .map(|node| (node.key(), node.exclusive_counter_value(index)))
            .filter(|&(_, value)| value != 0.0)
            .collect::<Vec<_>>();
        contributors.sort_by(|(_, v1), (_, v2)| v2.abs().total_cmp(&v1.abs()));
        for (scope, value) in contributors {
            writeln!(output, "  - {scope}: {value:+}")?;
        }
    }
    Ok(())
}

/// Display how often each marker was hit
fn print_markers(mut output: impl io::Write, event_tree: &EventTree) -> io::Result<()> {
    if event_tree.markers().is_empty() {
        return Ok(());
    }
    writeln!(output, "\nMarkers:")?;
    for (key, occurences) in event_tree.markers() {
        writeln!(output, "- {key}: {} occurence(s)", occurences.len())?;
    }
    Ok(())
}
