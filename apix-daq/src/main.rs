//! # Acquisition and calibration for ATLASPix sensors
//!
//! This binary drives one ATLASPix sensor behind an FPGA
//! readout: continuous data taking into run files, per
//! pixel trim tuning, S-curve sweeps and TOT measurement.
//! Everything is steered through a JSON configuration file
//! plus a handful of command line flags.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool,
                        Ordering};
use std::{thread, time};

use apix_daq::api::ApixDevice;
use apix_daq::calibration;
use apix_dataclasses::run::DaqConfig;

extern crate env_logger;
#[macro_use] extern crate log;

extern crate clap;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
  /// JSON configuration file. Falls back to built-in
  /// defaults when the file can not be read.
  #[arg(short, long, default_value_t = String::from("apix-daq.json"))]
  config : String,
  /// Take data continuously into a run file
  #[arg(long, default_value_t = false)]
  run : bool,
  /// End the run after this many seconds (0 waits for
  /// Ctrl-C)
  #[arg(long, default_value_t = 0)]
  nseconds : u64,
  /// Tune the per pixel trim DACs at the configured
  /// reference amplitude
  #[arg(long, default_value_t = false)]
  tune : bool,
  /// Sweep the injection amplitude and record per pixel
  /// hit counts
  #[arg(long, default_value_t = false)]
  scurve : bool,
  /// Sweep the injection amplitude and record per pixel
  /// average time-over-threshold
  #[arg(long, default_value_t = false)]
  measure_tot : bool,
  /// Mask pixels with more hits than this within one second
  /// of quiet listening (0 = off)
  #[arg(long, default_value_t = 0)]
  find_hot_pixels : u32,
  /// Fire a single pulse burst at this amplitude in volt
  /// (0 = off)
  #[arg(long, default_value_t = 0.0)]
  pulse : f64,
  /// Lowest injection amplitude of a sweep in volt
  #[arg(long, default_value_t = 0.1)]
  vmin : f64,
  /// Highest injection amplitude of a sweep in volt
  #[arg(long, default_value_t = 0.9)]
  vmax : f64,
  /// Amplitude steps per sweep
  #[arg(long, default_value_t = 10)]
  npoints : usize,
}

fn main() {

  env_logger::init();
  let args = Args::parse();

  println!("-----------------------------------------------");
  println!(" ** apix-daq *** ATLASPix readout & calibration");
  println!(" .. data taking, trim tuning, S-curve and TOT");
  println!(" .. sweeps for the ATLASPix1 sensor family");
  println!("-----------------------------------------------");

  let config = match DaqConfig::from_file(Path::new(&args.config)) {
    Err(err) => {
      warn!("Unable to read {}, using defaults! {err}", args.config);
      DaqConfig::new()
    }
    Ok(config) => config,
  };
  println!(" => Using {}", config);

  let mut device = match ApixDevice::open(config) {
    Err(err) => {
      error!("Unable to open the device! {err}");
      panic!("Without mapped register windows there is nothing we can do!");
    }
    Ok(device) => device,
  };
  match device.configure() {
    Err(err) => error!("The initial configuration failed! {err}"),
    Ok(_)    => ()
  }
  println!(" => Deserializer locked : {}", device.is_locked());

  let stop = Arc::new(AtomicBool::new(false));
  match signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&stop)) {
    Err(err) => warn!("Unable to install the SIGINT handler! {err}"),
    Ok(_)    => ()
  }

  if args.find_hot_pixels > 0 {
    match device.find_hot_pixels(args.find_hot_pixels) {
      Err(err) => error!("The hot pixel search failed! {err}"),
      Ok(_)    => ()
    }
  }

  if args.pulse > 0.0 {
    let npulses = device.config.npulses;
    let rise    = device.config.rise_ticks;
    let fall    = device.config.fall_ticks;
    match device.pulse(npulses, rise, fall, args.pulse) {
      Err(err) => error!("Unable to fire the pulse burst! {err}"),
      Ok(_)    => info!("Fired {} pulses at {} V", npulses, args.pulse)
    }
  }

  if args.tune {
    let amplitude = device.config.tuning_amplitude;
    let npulses   = device.config.npulses;
    match calibration::tune(&mut device, amplitude, npulses) {
      Err(err)    => error!("Tuning failed! {err}"),
      Ok(results) => info!("Tuned {} pixels", results.len())
    }
  }

  if args.scurve {
    let npulses = device.config.npulses;
    match calibration::s_curves(&mut device, args.vmin, args.vmax, npulses, args.npoints) {
      Err(err)  => error!("The S-curve sweep failed! {err}"),
      Ok(table) => {
        let path = Path::new(&device.config.output_directory).join("SCURVE.txt");
        match table.write(&path) {
          Err(err) => error!("Unable to write the S-curve table! {err}"),
          Ok(_)    => ()
        }
      }
    }
  }

  if args.measure_tot {
    let npulses = device.config.npulses;
    match calibration::measure_tot(&mut device, args.vmin, args.vmax, npulses, args.npoints) {
      Err(err)  => error!("The TOT sweep failed! {err}"),
      Ok(table) => {
        let path = Path::new(&device.config.output_directory).join("TOT.txt");
        match table.write(&path) {
          Err(err) => error!("Unable to write the TOT table! {err}"),
          Ok(_)    => ()
        }
      }
    }
  }

  if args.run {
    device.daq_start();
    let start = time::Instant::now();
    loop {
      if stop.load(Ordering::Relaxed) {
        info!("Caught SIGINT, ending the run");
        break;
      }
      if args.nseconds > 0 && start.elapsed().as_secs() >= args.nseconds {
        break;
      }
      thread::sleep(time::Duration::from_millis(100));
    }
    device.daq_stop();
    device.log_trigger_counts();
  }
}
