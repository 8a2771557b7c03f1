pub mod features;
pub mod gbm;
pub mod predictor;
pub mod reconcile;
pub mod sdv_fetcher;
pub mod trainer;
