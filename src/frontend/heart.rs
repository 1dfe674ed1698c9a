use clap::{Args, ValueEnum};

use crate::errors::PredictionError;
use crate::frontend::service::{FeatureRow, Prediction, PredictionService};
use crate::model::{Classifier, Preprocessor};

/// Column order of the heart-disease training data.
pub const HEART_FEATURES: [&str; 11] = [
    "age", "sex", "cp", "trestbps", "chol", "fbs", "restecg", "thalach", "exang", "oldpeak", "slope",
];

/// Position of `value` among its enum's variants, shifted by `offset`.
fn encode<T: ValueEnum + PartialEq>(value: &T, offset: usize) -> f64 {
    let position = T::value_variants()
        .iter()
        .position(|variant| variant == value)
        .unwrap_or_default();
    (position + offset) as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Sex {
    Female,
    Male,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChestPain {
    TypicalAngina,
    AtypicalAngina,
    NonAnginalPain,
    Asymptomatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum YesNo {
    No,
    Yes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RestingEcg {
    Normal,
    StTAbnormality,
    LvHypertrophy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StSlope {
    Upward,
    Flat,
    Downward,
}

fn oldpeak(value: &str) -> Result<f64, String> {
    let parsed: f64 = value.parse().map_err(|_| format!("[{value}] is not a number"))?;
    if (0.0..=6.2).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(format!("[{value}] is not in 0.0..=6.2"))
    }
}

/// Patient vitals.
#[derive(Debug, Clone, PartialEq, Args)]
pub struct HeartControls {
    #[arg(long, default_value_t = 54, value_parser = clap::value_parser!(u32).range(29..=77))]
    pub age: u32,
    #[arg(long, value_enum, default_value_t = Sex::Female)]
    pub sex: Sex,
    /// Chest pain type
    #[arg(long, value_enum, default_value_t = ChestPain::TypicalAngina)]
    pub chest_pain: ChestPain,
    /// Resting blood pressure (mm Hg)
    #[arg(long, default_value_t = 130, value_parser = clap::value_parser!(u32).range(94..=200))]
    pub resting_bp: u32,
    /// Serum cholesterol (mg/dL)
    #[arg(long, default_value_t = 245, value_parser = clap::value_parser!(u32).range(126..=564))]
    pub cholesterol: u32,
    /// Fasting blood sugar > 120 mg/dL
    #[arg(long, value_enum, default_value_t = YesNo::No)]
    pub fasting_blood_sugar: YesNo,
    #[arg(long, value_enum, default_value_t = RestingEcg::Normal)]
    pub resting_ecg: RestingEcg,
    /// Max heart rate achieved
    #[arg(long, default_value_t = 150, value_parser = clap::value_parser!(u32).range(71..=202))]
    pub max_heart_rate: u32,
    /// Exercise-induced angina
    #[arg(long, value_enum, default_value_t = YesNo::No)]
    pub exercise_angina: YesNo,
    /// ST depression
    #[arg(long, default_value_t = 1.0, value_parser = oldpeak)]
    pub oldpeak: f64,
    /// Slope of the ST segment
    #[arg(long, value_enum, default_value_t = StSlope::Upward)]
    pub slope: StSlope,
}

impl Default for HeartControls {
    fn default() -> Self {
        Self {
            age: 54,
            sex: Sex::Female,
            chest_pain: ChestPain::TypicalAngina,
            resting_bp: 130,
            cholesterol: 245,
            fasting_blood_sugar: YesNo::No,
            resting_ecg: RestingEcg::Normal,
            max_heart_rate: 150,
            exercise_angina: YesNo::No,
            oldpeak: 1.0,
            slope: StSlope::Upward,
        }
    }
}

impl HeartControls {
    /// Encoded vitals in [`HEART_FEATURES`] order.
    pub fn to_feature_row(&self) -> FeatureRow {
        let values = [
            f64::from(self.age),
            encode(&self.sex, 0),
            encode(&self.chest_pain, 1),
            f64::from(self.resting_bp),
            f64::from(self.cholesterol),
            encode(&self.fasting_blood_sugar, 0),
            encode(&self.resting_ecg, 0),
            f64::from(self.max_heart_rate),
            encode(&self.exercise_angina, 0),
            self.oldpeak,
            encode(&self.slope, 1),
        ];

        HEART_FEATURES
            .iter()
            .zip(values)
            .fold(FeatureRow::new(), |row, (name, value)| row.with(name, value))
    }
}

pub fn service<M: Classifier>(model: M, preprocessor: Preprocessor) -> PredictionService<M> {
    PredictionService::with_preprocessor(model, preprocessor)
}

pub fn run<M: Classifier>(service: &PredictionService<M>, controls: &HeartControls) -> Result<Prediction, PredictionError> {
    service.predict(&controls.to_feature_row())
}

pub fn render(prediction: &Prediction) -> String {
    if prediction.is_positive() {
        format!("High risk of heart disease. Probability: {:.2}", prediction.probability)
    } else {
        format!("No heart disease detected. Probability: {:.2}", prediction.probability)
    }
}
