//! `Cluster` rules

use warden_core::Feature;
use warden_core::labels::CLUSTER_OPERATOR_VERSION;

use super::common::{
    CLUSTER_OPERATOR, DefaultOperatorLabel, ProtectLabels, ValidateAnnotations, ValidateUpgrade,
};
use crate::pipeline::{MutationChain, ValidationChain, restricted};

pub fn mutator() -> MutationChain {
    MutationChain::new()
        .always(DefaultOperatorLabel::new(CLUSTER_OPERATOR_VERSION, CLUSTER_OPERATOR))
        .skip_releases_with(Feature::CapiControllers)
}

pub fn validator() -> ValidationChain {
    ValidationChain::new()
        .always(ValidateAnnotations)
        .on_update(restricted(ProtectLabels))
        .on_update(restricted(ValidateUpgrade))
        .skip_releases_with(Feature::CapiControllers)
}
