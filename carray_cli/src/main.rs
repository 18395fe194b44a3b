use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use carray_codecs::codec_by_name;
use carray_core::expr::{self, Binding, Bindings, Evaluated};
use carray_core::utils::human_bytes;
use carray_core::{
    arange, detect_number_of_cores, eval, nthreads, set_nthreads, Array, ArrayOptions, CArray,
    CParams, CTable, ColumnData, ScalarKind, Value, Vars,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "carray",
    about = "Chunked compressed arrays: expression and filter benchmarks, engine info",
    version
)]
struct Cli {
    /// Worker threads for compression and evaluation (default: all cores)
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Time a chunk-wise table expression against a dense evaluation
    BenchExpr {
        /// Number of rows
        #[arg(short = 'n', long, default_value_t = 10_000_000)]
        len: usize,
        /// Expression over the column `x` (and `y`, `z` if referenced)
        #[arg(short, long, default_value = "(((.25*x + .75)*x - 1.5)*x - 2)<0")]
        expr: String,
        /// Compression level (0-9)
        #[arg(short, long, default_value_t = 9)]
        clevel: u8,
        /// Codec: zstd | lz4 | deflate | passthrough
        #[arg(long, default_value = "zstd")]
        codec: String,
    },
    /// Time where/wheretrue scans over normally distributed data
    BenchWhere {
        /// Number of items
        #[arg(short = 'n', long, default_value_t = 1_000_000)]
        len: usize,
        /// Values above this threshold are selected
        #[arg(short = 'T', long, default_value_t = 100.0)]
        threshold: f64,
        /// Compression level (0-9)
        #[arg(short, long, default_value_t = 1)]
        clevel: u8,
        /// Codec: zstd | lz4 | deflate | passthrough
        #[arg(long, default_value = "zstd")]
        codec: String,
        /// Random seed
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
    /// Print library, codec and thread information
    Info {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn options(codec: &str, clevel: u8) -> anyhow::Result<ArrayOptions> {
    let codec = codec_by_name(codec)?;
    let cparams = CParams::new(clevel, true).context("invalid compression level")?;
    Ok(ArrayOptions::new(codec).cparams(cparams))
}

/// Deterministic normal(0, 100) samples (LCG + Box-Muller).
fn normal_samples(len: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    let mut uniform = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 11) as f64 + 0.5) / (1u64 << 53) as f64
    };
    (0..len)
        .map(|_| {
            let (u1, u2) = (uniform(), uniform());
            100.0 * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
        })
        .collect()
}

fn report(label: &str, t0: Instant) {
    eprintln!("  {:<28}: {:.3}s", label, t0.elapsed().as_secs_f64());
}

fn last<I: Iterator<Item = carray_core::Result<T>>, T>(iter: I) -> anyhow::Result<Option<T>> {
    let mut last = None;
    for item in iter {
        last = Some(item?);
    }
    Ok(last)
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_bench_expr(len: usize, sexpr: &str, clevel: u8, codec: &str) -> anyhow::Result<()> {
    let opts = options(codec, clevel)?;
    eprintln!("Creating inputs...");
    let x = arange(0.0, len as f64, 1.0, ScalarKind::Float64, &opts)?;
    let parsed = expr::parse(sexpr).context("parsing expression")?;
    let vars = parsed.variables();
    let mut columns = vec![ColumnData::CArray(x)];
    let mut names = vec!["x".to_string()];
    for extra in ["y", "z"] {
        if vars.iter().any(|v| v == extra) {
            columns.push(ColumnData::CArray(arange(0.0, len as f64, 1.0, ScalarKind::Float64, &opts)?));
            names.push(extra.to_string());
        }
    }
    let table = CTable::from_columns(columns, Some(names), opts.clone())?;
    eprintln!("{table}");
    eprintln!("Evaluating '{}' with {} points", sexpr, len);

    let t0 = Instant::now();
    let mut bindings = Bindings::new();
    for (name, col) in table.columns() {
        bindings.insert(name.to_string(), Binding::Array(col.to_array()?));
    }
    let dense = match expr::evaluate(&parsed, &bindings)? {
        Evaluated::Array(a) => a,
        Evaluated::Scalar(v) => anyhow::bail!("expression is constant ({v})"),
    };
    report("dense (materialized)", t0);
    drop(bindings);

    let t0 = Instant::now();
    let out = table.eval(sexpr)?;
    report("ctable (chunk-wise)", t0);

    anyhow::ensure!(
        out.to_array()? == dense,
        "chunk-wise result differs from dense evaluation"
    );
    eprintln!(
        "  result                      : {} items, {} -> {} ({:.2}x)",
        out.len(),
        human_bytes(out.nbytes()),
        human_bytes(out.cbytes()),
        out.ratio()
    );
    Ok(())
}

fn run_bench_where(len: usize, threshold: f64, clevel: u8, codec: &str, seed: u64) -> anyhow::Result<()> {
    let opts = options(codec, clevel)?;
    let a = Array::from_vec(normal_samples(len, seed));

    let t0 = Instant::now();
    let values = a.to_vec::<f64>()?;
    let sa = values.iter().rposition(|v| *v > threshold);
    report("where dense", t0);

    let vars = Vars::new().with("a", &a).with("T", Value::Float64(threshold));

    let t0 = Instant::now();
    let iac = arange(0.0, len as f64, 1.0, ScalarKind::Int64, &opts)?;
    let ac = eval("a>T", &vars, &opts)?
        .into_carray()
        .context("mask expression produced a scalar")?;
    let sac1 = last(iac.filter(&ac)?)?.and_then(|v| v.as_i64()).map(|v| v as usize);
    report("where carray", t0);

    let t0 = Instant::now();
    let sac2 = last(ac.wheretrue()?)?;
    report("wheretrue carray", t0);

    let t0 = Instant::now();
    let ca = CArray::new(&a, &opts)?;
    let table = CTable::from_columns(vec![ColumnData::CArray(ca)], Some(vec!["a".into()]), opts.clone())?;
    let tvars = Vars::new().with("T", Value::Float64(threshold));
    let mask = table.eval_with("a>T", &tvars)?;
    let sac3 = last(table.filter(&mask, Some(&[carray_core::NROW][..]))?)?
        .and_then(|row| row[0].as_i64())
        .map(|v| v as usize);
    report("ctable where", t0);

    eprintln!("  results                     : {:?} {:?} {:?} {:?}", sa, sac1, sac2, sac3);
    anyhow::ensure!(
        sa == sac1 && sa == sac2 && sa == sac3,
        "scan results disagree"
    );
    Ok(())
}

#[derive(Serialize)]
struct Info {
    version: String,
    cores: usize,
    nthreads: usize,
    codecs: Vec<CodecInfo>,
}

#[derive(Serialize)]
struct CodecInfo {
    id: u16,
    name: &'static str,
    version: String,
}

fn run_info(json: bool) -> anyhow::Result<()> {
    let default = carray_codecs::default_codec();
    let codecs = ["zstd", "lz4", "deflate", "passthrough"]
        .iter()
        .map(|n| {
            let c = codec_by_name(n)?;
            Ok(CodecInfo {
                id: c.id(),
                name: c.name(),
                version: c.version(),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let info = Info {
        version: carray_core::version(default.as_ref()),
        cores: detect_number_of_cores(),
        nthreads: nthreads(),
        codecs,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    println!("=== {} ===", info.version);
    println!();
    println!("  cores          : {}", info.cores);
    println!("  threads        : {}", info.nthreads);
    for c in &info.codecs {
        println!("  codec {:<9}: id={} {}", c.name, c.id, c.version);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    if let Some(n) = cli.threads {
        set_nthreads(n).context("setting thread count")?;
    }
    info!(nthreads = nthreads(), "engine ready");

    match cli.command {
        Commands::BenchExpr {
            len,
            expr,
            clevel,
            codec,
        } => run_bench_expr(len, &expr, clevel, &codec),
        Commands::BenchWhere {
            len,
            threshold,
            clevel,
            codec,
            seed,
        } => run_bench_where(len, threshold, clevel, &codec, seed),
        Commands::Info { json } => run_info(json),
    }
}
