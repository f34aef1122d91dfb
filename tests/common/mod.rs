//! Stub learners shared by the integration tests

#![allow(dead_code)]

use kolosal_ensemble::optimizer::ParameterValue;
use kolosal_ensemble::training::Learner;
use kolosal_ensemble::{KolosalError, Result};
use ndarray::{Array1, Array2};
use std::sync::{Arc, Mutex, Once};

static TRACING: Once = Once::new();

/// Route library logs to the test output, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "kolosal_ensemble=warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Predicts the same value for every row
#[derive(Clone)]
pub struct Constant(pub f64);

impl Learner for Constant {
    fn name(&self) -> &str {
        "constant"
    }

    fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(Array1::from_elem(x.nrows(), self.0))
    }

    fn boxed_clone(&self) -> Box<dyn Learner> {
        Box::new(self.clone())
    }
}

/// Predicts one feature column verbatim
#[derive(Clone)]
pub struct Column(pub usize);

impl Learner for Column {
    fn name(&self) -> &str {
        "column"
    }

    fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(x.column(self.0).to_owned())
    }

    fn boxed_clone(&self) -> Box<dyn Learner> {
        Box::new(self.clone())
    }
}

/// Predicts the most frequent training label (lowest on ties)
#[derive(Clone, Default)]
pub struct Majority {
    label: Option<f64>,
}

impl Learner for Majority {
    fn name(&self) -> &str {
        "majority"
    }

    fn fit(&mut self, _x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let mut labels = y.to_vec();
        labels.sort_by(f64::total_cmp);
        let mut best = (labels[0], 0);
        let mut i = 0;
        while i < labels.len() {
            let run = labels[i..].iter().take_while(|v| **v == labels[i]).count();
            if run > best.1 {
                best = (labels[i], run);
            }
            i += run;
        }
        self.label = Some(best.0);
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let label = self.label.ok_or(KolosalError::ModelNotFitted)?;
        Ok(Array1::from_elem(x.nrows(), label))
    }

    fn boxed_clone(&self) -> Box<dyn Learner> {
        Box::new(self.clone())
    }
}

/// Predicts 1.0 where column 0 is at least `threshold`, else 0.0.
/// `threshold` is tunable through `set_option`.
#[derive(Clone)]
pub struct Threshold {
    pub threshold: f64,
}

impl Learner for Threshold {
    fn name(&self) -> &str {
        "threshold"
    }

    fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(x.column(0).mapv(|v| if v >= self.threshold { 1.0 } else { 0.0 }))
    }

    fn boxed_clone(&self) -> Box<dyn Learner> {
        Box::new(self.clone())
    }

    fn set_option(&mut self, path: &[String], value: &ParameterValue) -> Result<()> {
        match path {
            [key] if key == "threshold" => {
                self.threshold = value.as_float().ok_or_else(|| KolosalError::InvalidParameter {
                    name: key.clone(),
                    value: value.to_string(),
                    reason: "expected a number".to_string(),
                })?;
                Ok(())
            }
            _ => Err(KolosalError::InvalidParameter {
                name: path.join("."),
                value: value.to_string(),
                reason: "unknown option for 'threshold'".to_string(),
            }),
        }
    }
}

/// Records every matrix it is fit on. Clones share the record.
#[derive(Clone, Default)]
pub struct Recorder {
    pub fits: Arc<Mutex<Vec<Array2<f64>>>>,
    label: Option<f64>,
}

impl Recorder {
    pub fn fit_shapes(&self) -> Vec<(usize, usize)> {
        self.fits.lock().unwrap().iter().map(|x| x.dim()).collect()
    }

    pub fn last_fit(&self) -> Option<Array2<f64>> {
        self.fits.lock().unwrap().last().cloned()
    }
}

impl Learner for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fits.lock().unwrap().push(x.clone());
        self.label = y.first().copied();
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let label = self.label.ok_or(KolosalError::ModelNotFitted)?;
        Ok(Array1::from_elem(x.nrows(), label))
    }

    fn boxed_clone(&self) -> Box<dyn Learner> {
        Box::new(self.clone())
    }
}

/// Fails on fit or on transform
#[derive(Clone)]
pub struct Failing {
    pub on_fit: bool,
}

impl Learner for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        if self.on_fit {
            return Err(KolosalError::TrainingError("fit always fails".to_string()));
        }
        Ok(())
    }

    fn transform(&self, _x: &Array2<f64>) -> Result<Array1<f64>> {
        Err(KolosalError::InferenceError("transform always fails".to_string()))
    }

    fn boxed_clone(&self) -> Box<dyn Learner> {
        Box::new(self.clone())
    }
}

/// Ten rows, two label-valued feature columns, balanced binary labels
pub fn binary_data() -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((10, 2), |(i, j)| ((i + j) % 2) as f64);
    let y = Array1::from_shape_fn(10, |i| (i % 2) as f64);
    (x, y)
}
