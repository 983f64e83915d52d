//! Builder registry
//!
//! Folds partner and builder attestations into one row per builder and one
//! row per partner, then enriches builders with ENS names and Talent data.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::services::{EasService, EnsResolver, TalentClient, TalentProfile, VerificationPartner, VerifiedBuilder};

const UNKNOWN_PARTNER: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderSummary {
    /// Earliest attestation of the builder
    pub id: String,
    pub address: String,
    pub total_verifications: usize,
    pub earliest_attestation_id: String,
    pub earliest_attestation_date: i64,
    pub earliest_partner_name: String,
    pub earliest_partner_attestation_id: Option<String>,
    pub context: Option<String>,
    /// Every attestation of the builder, in input order
    pub attestations: Vec<VerifiedBuilder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ens: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub talent_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub talent_profile: Option<TalentProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerSummary {
    pub id: String,
    pub address: String,
    pub name: String,
    pub url: String,
    #[serde(rename = "attestationUID")]
    pub attestation_uid: String,
    pub verified_builders_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryMetrics {
    pub total_builders: usize,
    pub total_partners: usize,
    pub total_attestations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registry {
    pub builders: Vec<BuilderSummary>,
    pub partners: Vec<PartnerSummary>,
    pub metrics: RegistryMetrics,
}

// == Aggregate ==
/// Groups builder attestations by recipient.
///
/// Each builder keeps the data of its earliest attestation (first one wins on
/// equal times) and lists and counts all of them. Builders come out in first-seen
/// order; partners keep their input order.
pub fn aggregate(partners: &[VerificationPartner], attestations: &[VerifiedBuilder]) -> Registry {
    let mut order: Vec<String> = Vec::new();
    let mut builders: HashMap<String, BuilderSummary> = HashMap::new();
    let mut per_partner: HashMap<&str, HashSet<String>> = HashMap::new();

    for builder in attestations {
        let attestation = &builder.attestation;
        let address = attestation.recipient.to_lowercase();

        if let Some(partner) = attestation.reference() {
            per_partner.entry(partner).or_default().insert(address.clone());
        }

        match builders.get_mut(&address) {
            Some(existing) => {
                existing.total_verifications += 1;
                existing.attestations.push(builder.clone());
                if attestation.time < existing.earliest_attestation_date {
                    let mut earliest = summarize(&address, builder);
                    earliest.total_verifications = existing.total_verifications;
                    earliest.attestations = std::mem::take(&mut existing.attestations);
                    *existing = earliest;
                }
            }
            None => {
                order.push(address.clone());
                builders.insert(address.clone(), summarize(&address, builder));
            }
        }
    }

    let partners: Vec<PartnerSummary> = partners
        .iter()
        .map(|p| PartnerSummary {
            id: p.attestation.id.clone(),
            address: p.attestation.recipient.clone(),
            name: p.name.clone(),
            url: p.url.clone(),
            attestation_uid: p.attestation.id.clone(),
            verified_builders_count: per_partner
                .get(p.attestation.id.as_str())
                .map_or(0, HashSet::len),
        })
        .collect();

    let builders: Vec<BuilderSummary> = order
        .iter()
        .filter_map(|address| builders.remove(address))
        .collect();

    let metrics = RegistryMetrics {
        total_builders: builders.len(),
        total_partners: partners.len(),
        total_attestations: attestations.len(),
    };

    Registry {
        builders,
        partners,
        metrics,
    }
}

fn summarize(address: &str, builder: &VerifiedBuilder) -> BuilderSummary {
    let attestation = &builder.attestation;
    BuilderSummary {
        id: attestation.id.clone(),
        address: address.to_string(),
        total_verifications: 1,
        earliest_attestation_id: attestation.id.clone(),
        earliest_attestation_date: attestation.time,
        earliest_partner_name: builder
            .partner_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_PARTNER.to_string()),
        earliest_partner_attestation_id: attestation.reference().map(str::to_string),
        context: Some(builder.context.clone()).filter(|c| !c.is_empty()),
        attestations: vec![builder.clone()],
        ens: None,
        talent_score: None,
        talent_profile: None,
    }
}

// == Load ==
/// Loads the registry and enriches every builder.
///
/// Attestation failures are returned; ENS and Talent failures only leave the
/// matching fields empty. ENS and Talent batches run concurrently.
pub async fn load(
    eas: &EasService,
    ens: &EnsResolver,
    talent: &TalentClient,
    cancel: &CancellationToken,
) -> Result<Registry> {
    let partners = eas.partners().await?;
    let attestations = eas.builders_with(&partners).await?;
    let mut registry = aggregate(&partners, &attestations);

    let addresses: Vec<&str> = registry.builders.iter().map(|b| b.address.as_str()).collect();
    let (names, talent_data) = tokio::join!(
        ens.resolve_all(addresses.iter().copied(), cancel),
        talent.batch(addresses.iter().copied(), cancel),
    );

    for builder in &mut registry.builders {
        builder.ens = names.get(&builder.address).cloned();
        if let Some(data) = talent_data.get(&builder.address) {
            builder.talent_score = data.score;
            builder.talent_profile = data.profile.clone();
        }
    }

    info!(
        builders = registry.metrics.total_builders,
        partners = registry.metrics.total_partners,
        ens_names = names.len(),
        talent_entries = talent_data.len(),
        "registry loaded"
    );
    Ok(registry)
}
