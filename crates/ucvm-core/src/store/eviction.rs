//! Size limits applied to the settings document before it is written.

use crate::config::StoreLimits;

use super::settings::{PackagePreset, Settings, VmConfig};

/// Trim `settings` to `limits`. Returns how many entries were evicted.
pub(crate) fn enforce_limits(settings: &mut Settings, limits: &StoreLimits) -> usize {
    let vm = evict_vm_configs(&mut settings.vm_configs, limits.max_vm_configs);
    let presets = evict_package_presets(&mut settings.package_presets, limits.max_package_presets);
    if vm + presets > 0 {
        tracing::debug!(vm, presets, "evicted settings entries over limit");
    }
    vm + presets
}

/// Keep the `max` most recently used configs (falling back to creation time).
fn evict_vm_configs(configs: &mut Vec<VmConfig>, max: usize) -> usize {
    if configs.len() <= max {
        return 0;
    }
    configs.sort_by(|a, b| b.recency().cmp(&a.recency()));
    let evicted = configs.len() - max;
    configs.truncate(max);
    evicted
}

/// Built-ins are always kept; user presets fill the remaining quota, newest first.
fn evict_package_presets(presets: &mut Vec<PackagePreset>, max: usize) -> usize {
    if presets.len() <= max {
        return 0;
    }
    let (builtin, mut user): (Vec<_>, Vec<_>) =
        std::mem::take(presets).into_iter().partition(|p| p.builtin);
    let quota = max.saturating_sub(builtin.len());
    let mut evicted = 0;
    if user.len() > quota {
        user.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        evicted = user.len() - quota;
        user.truncate(quota);
    }
    *presets = builtin;
    presets.extend(user);
    evicted
}
