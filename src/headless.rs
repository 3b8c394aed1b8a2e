use crate::cli::Args;
use anyhow::{ensure, Result};
use log::info;
use std::cell::RefCell;
use std::io::{self, BufWriter, ErrorKind, Write};
use std::rc::Rc;
use titration::{Command, Experiment, Sample, Settings, TitrationObserver};

/// First write error seen by the sink, shared with the run loop.
type WriteFailure = Rc<RefCell<Option<io::Error>>>;

/// Streams the curve as `volume_ml,ph` rows. Stops writing after the first error.
struct CsvSink<W: Write> {
    out: W,
    failed: WriteFailure,
}

impl<W: Write> CsvSink<W> {
    fn record(&mut self, res: io::Result<()>) {
        if let Err(e) = res {
            let mut failed = self.failed.borrow_mut();
            if failed.is_none() {
                *failed = Some(e);
            }
        }
    }

    fn healthy(&self) -> bool {
        self.failed.borrow().is_none()
    }
}

impl<W: Write> TitrationObserver for CsvSink<W> {
    fn on_sample(&mut self, sample: &Sample) {
        if self.healthy() {
            let res = writeln!(self.out, "{:.4},{:.4}", sample.volume_ml, sample.ph);
            self.record(res);
        }
    }

    fn on_equivalence(&mut self, _sample: &Sample) {
        if self.healthy() {
            let res = self.out.flush();
            self.record(res);
        }
    }
}

impl<W: Write> Drop for CsvSink<W> {
    fn drop(&mut self) {
        if self.healthy() {
            let _ = self.out.flush();
        }
    }
}

/// Ticks until `until_ml` is delivered, the burette is spent, or `stop` says so.
fn drive(lab: &mut Experiment, dt: f64, until_ml: f64, stop: impl Fn() -> bool) -> u64 {
    let mut ticks: u64 = 0;
    loop {
        lab.tick(dt);
        ticks += 1;
        if stop() {
            break;
        }
        let st = lab.state();
        if st.volume_ml() >= until_ml {
            break;
        }
        if st.is_finished() && lab.droplets().in_flight() == 0 {
            break;
        }
    }
    ticks
}

/// Valve open at full flow until `--until-ml` is delivered or the burette is empty.
pub(crate) fn run(settings: &Settings, args: &Args) -> Result<()> {
    ensure!(args.dt.is_finite() && args.dt > 0.0, "--dt must be a positive number of seconds");
    ensure!(args.until_ml.is_finite() && args.until_ml > 0.0, "--until-ml must be positive");

    let mut lab = Experiment::new(settings)?;
    {
        let mut out = io::stdout().lock();
        writeln!(out, "volume_ml,ph")?;
    }
    let failed: WriteFailure = Rc::new(RefCell::new(None));
    lab.subscribe(Box::new(CsvSink {
        out: BufWriter::new(io::stdout()),
        failed: failed.clone(),
    }));

    let st = lab.state();
    info!(
        "{} / {} model: equivalence expected at {:.2} mL, starting pH {:.3}",
        st.reaction().label(),
        st.model().name(),
        st.equivalence_volume_ml(),
        st.ph()
    );

    lab.apply(Command::SetFlowRate(settings.simulation.flow_max))?;
    lab.apply(Command::ToggleValve)?;

    let ticks = drive(&mut lab, args.dt, args.until_ml, || failed.borrow().is_some());

    let failure = failed.borrow_mut().take();
    if let Some(e) = failure {
        // `| head` closing the pipe is a normal way to end.
        if e.kind() == ErrorKind::BrokenPipe {
            info!("output closed after {:.2} mL", lab.state().volume_ml());
            return Ok(());
        }
        return Err(anyhow::Error::new(e).context("writing CSV to stdout"));
    }

    let st = lab.state();
    info!(
        "{} drops, {:.2} mL in {:.1} s simulated; final pH {:.3} ({})",
        st.total_drops_delivered(),
        st.volume_ml(),
        ticks as f64 * args.dt,
        st.ph(),
        st.stage()
    );
    Ok(())
}
