use std::{path::PathBuf, time::Instant};

use clap::Parser;
use log::info;
use ltcfit::{
    Result,
    align::{AlignOptions, align},
    fit::{AMPLITUDE_SAMPLES, FitOptions, estimate_amplitudes, fit, generate_target_buffer},
    lut::{LtcTable, LutLayout},
    output::{save_scalars, save_table},
    post::postprocess,
};

/// Fit the 4-D anisotropic LTC lookup table (alpha_x, alpha_y, theta, phi).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of optimization iterations
    #[arg(long, default_value_t = 10_000)]
    epochs: usize,

    /// Directory the fitted tables are written to
    #[arg(short, long)]
    savedir: PathBuf,

    /// Bins for each hyperparameter
    #[arg(long, default_value_t = 8)]
    alphax_bins: usize,
    #[arg(long, default_value_t = 8)]
    alphay_bins: usize,
    #[arg(long, default_value_t = 8)]
    theta_bins: usize,
    #[arg(long, default_value_t = 8)]
    phi_bins: usize,

    /// Divide each optimization epoch into this many cell batches
    #[arg(short, long, default_value_t = 8)]
    batch: usize,

    /// Ground-truth samples per LUT cell
    #[arg(short, long, default_value_t = 2048)]
    omega: usize,

    /// Learning rate for the SGD optimizer, 1.0 works well
    #[arg(long, default_value_t = 1.0)]
    lr: f64,

    /// Number of progressive refinement divisions in the alignment search
    #[arg(long, default_value_t = 3)]
    eps_divs: usize,

    /// Base RNG seed
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Log output
    #[arg(short, long)]
    log: Option<String>,

    /// Number of threads (0 = all cores, -N = all cores - N, N = number of threads)
    #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
    threads: i32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(log_out) = &args.log {
        let target = Box::new(std::fs::File::create(log_out).expect("Can't create file"));
        pretty_env_logger::formatted_builder()
            .filter_level(log::LevelFilter::Info)
            .target(env_logger::Target::Pipe(target))
            .init();
    } else {
        pretty_env_logger::formatted_builder()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    // Set number of threads
    if args.threads != 0 {
        let nbthreads = ltcfit::effective_threads(args.threads);
        info!("Number threads set at : {nbthreads}");
        rayon::ThreadPoolBuilder::new()
            .num_threads(nbthreads)
            .build_global()
            .unwrap();
    }

    std::fs::create_dir_all(&args.savedir)?;

    let layout = LutLayout::Anisotropic {
        alpha_x_bins: args.alphax_bins,
        alpha_y_bins: args.alphay_bins,
        theta_bins: args.theta_bins,
        phi_bins: args.phi_bins,
    };
    let mut table = LtcTable::new(layout);
    let opts = FitOptions {
        epochs: args.epochs,
        batches: args.batch,
        omega: args.omega,
        lr: args.lr,
        seed: args.seed,
        ..FitOptions::default()
    };

    let start = Instant::now();
    let mut target = generate_target_buffer(&table, &opts)?;
    fit(&mut table, &mut target, &opts)?;
    align(&mut table, &AlignOptions::with_divs(args.eps_divs, args.seed));
    postprocess(&mut table);
    let (amplitude, fresnel) = estimate_amplitudes(&table, AMPLITUDE_SAMPLES, args.seed);
    info!("Fitting time: {:?}", start.elapsed());

    save_table(&args.savedir.join("alphax_alphay_theta_phi.npy"), &table)?;
    save_scalars(&args.savedir.join("amplitude.npy"), &table, &amplitude)?;
    save_scalars(&args.savedir.join("fresnel.npy"), &table, &fresnel)?;
    info!("Tables written to {}", args.savedir.display());

    Ok(())
}
