//! RoomEQ - measurement, room correction and PEQ fitting
//!
//! Copyright (C) 2025 Pierre Aubert pierre(at)spinorama(dot)org
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful,
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License
//! along with this program.  If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use roomeq::cli::{Args, Command};
use roomeq::workflow;
use std::process;

fn run(args: &Args) -> roomeq::Result<()> {
	match &args.command {
		Command::Sweep(a) => {
			let cfg = a.measurement_config()?;
			let sweep = workflow::write_sweep(&cfg, &a.output)?;
			println!(
				"✅ sweep {} samples at {} Hz, {} channel(s) -> {}",
				sweep.n,
				sweep.fs,
				cfg.output_channels,
				a.output.display()
			);
		}
		Command::Measure(a) => {
			let cfg = a.measurement_config()?;
			let m = workflow::run_measure(&a.capture, &cfg, a.mic.as_deref(), &a.output)?;
			workflow::print_measurement(&m);
			if !m.warnings.is_empty() {
				println!("⚠️ check the measurement before using it");
			}
		}
		Command::Eq(a) => {
			let cfg = a.eq_config()?;
			let out = workflow::run_eq(&a.frd, &cfg, &a.output)?;
			println!("✅ ref level {:.2} dB", out.eq.ref_level);
			for f in &out.files {
				println!("  - {}", f.display());
			}
		}
		Command::Peq(a) => {
			let cfg = a.peq_config()?;
			let source = a.source()?;
			if let Some(peq_file) = &a.analyse {
				let record = workflow::run_peq_analysis(peq_file, &source, cfg.mag_offset, cfg.fs)?;
				workflow::print_peq(&record, record.fs.unwrap_or(cfg.fs));
				return Ok(());
			}
			let output = a.output_path(&source);
			let fit = workflow::run_peq(&source, &cfg, &output)?;
			workflow::print_peq(&fit.record, cfg.fs);
			println!("✅ {}", output.display());
		}
	}
	Ok(())
}

fn main() {
	let args = Args::parse();
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level())).init();

	if let Err(e) = run(&args) {
		eprintln!("❌ Error: {}", e);
		process::exit(if e.is_configuration_error() { 2 } else { 1 });
	}
}
