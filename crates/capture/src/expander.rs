use std::collections::{HashMap, HashSet};

use argus_core::{CookieTable, Device, Environment, Page, PageModel};

use crate::job::{Job, JobOptions};

/// Environment aliases touched per device since the last full queue drain.
/// Guards against duplicate concurrent refreshes and decides whether a drain
/// triggers a comparison. Distinct from a version's recorded sets, which are
/// cumulative for the round.
#[derive(Debug, Default)]
pub struct RefreshingSet {
    sets: HashMap<Device, HashSet<String>>,
}

impl RefreshingSet {
    /// Returns false when the pair was already marked.
    pub fn mark(&mut self, device: Device, alias: &str) -> bool {
        self.sets
            .entry(device)
            .or_default()
            .insert(alias.to_string())
    }

    pub fn contains(&self, device: Device, alias: &str) -> bool {
        self.sets
            .get(&device)
            .map(|set| set.contains(alias))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.sets.values().all(|set| set.is_empty())
    }

    pub fn clear(&mut self) {
        self.sets.clear();
    }
}

/// One job for one page of one environment/device pair.
pub fn job_for_page(
    model: &PageModel,
    cookies: &CookieTable,
    env: &Environment,
    device: Device,
    page: &Page,
) -> Job {
    let profile = device.profile();
    Job {
        url: model.resolve_url(page, env),
        name: page.name.clone(),
        options: JobOptions {
            env: env.alias.clone(),
            device,
            cookies: cookies.resolve(&page.cookies),
            user_agent: profile.user_agent.to_string(),
            viewport: profile.viewport,
        },
    }
}

/// Expand a whole-environment refresh into one job per configured page with a
/// non-empty URL. The refresh guard lives with the caller; this is pure.
pub fn expand(
    model: &PageModel,
    cookies: &CookieTable,
    env: &Environment,
    device: Device,
) -> Vec<Job> {
    model
        .pages(device)
        .iter()
        .filter(|page| !page.url.is_empty())
        .map(|page| job_for_page(model, cookies, env, device, page))
        .collect()
}
