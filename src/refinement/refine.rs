//! Domain splitting.
//!
//! Every function here is pure: given a domain and its configuration it
//! returns the children to branch on. A returned child is always
//! contained in its parent, and repeated refinement reaches an atomic
//! domain in finitely many steps.

use super::config::RefinementConfig;
use crate::model::{CategoricalDomain, Interval, NumericDomain};

/// Log-scale refinement never produces sub-intervals shorter than this.
pub const MIN_LOG_INTERVAL_LENGTH: f64 = 1e-10;

/// Whether a numeric domain needs no further refinement.
///
/// Point intervals are always atomic, as are integer domains that
/// contain no integer. Otherwise the interval is atomic when its length
/// (relative length on a log scale) is at most the configured
/// `interval_length`.
pub fn is_atomic(domain: &NumericDomain, config: &RefinementConfig) -> bool {
    let interval = domain.interval();
    if interval.is_point() {
        return true;
    }
    if domain.is_integer && domain.integer_count() <= 1 {
        return true;
    }
    let measure = if config.log_scale {
        interval.relative_length()
    } else {
        interval.length()
    };
    measure <= config.interval_length
}

/// Splits a numeric domain one level deeper.
///
/// `already_set` tells whether the parameter was refined before on this
/// path. An atomic domain yields itself on the first visit (so the
/// parameter gets a value) and nothing once set, which signals the caller
/// to close the parameter. Small integer domains are enumerated as
/// points. Everything else is split linearly, or logarithmically around
/// `focus` on the first refinement of a log-scale parameter. Endpoints
/// are only offered on the first refinement.
///
/// # Examples
///
/// ```
/// use u_configsearch::model::{Interval, NumericDomain};
/// use u_configsearch::refinement::{refine_numeric, RefinementConfig};
///
/// let config = RefinementConfig::linear(1.0, 5);
/// let children = refine_numeric(&NumericDomain::real(0.0, 10.0), &config, 0.0, false);
/// assert_eq!(children.len(), 5);
/// assert_eq!(children[0], Interval::new(0.0, 2.0));
/// ```
pub fn refine_numeric(
    domain: &NumericDomain,
    config: &RefinementConfig,
    focus: f64,
    already_set: bool,
) -> Vec<Interval> {
    let interval = domain.interval();
    if is_atomic(domain, config) {
        return if already_set { Vec::new() } else { vec![interval] };
    }

    if domain.is_integer && domain.integer_count() <= config.refinements_per_step as i64 {
        let lo = interval.min.ceil() as i64;
        let hi = interval.max.floor() as i64;
        return (lo..=hi).map(|v| Interval::point(v as f64)).collect();
    }

    let include_endpoints = config.include_endpoints && !already_set;
    let children = if already_set || !config.log_scale {
        refine_linear(
            interval,
            config.refinements_per_step,
            config.interval_length,
            config.log_scale,
            include_endpoints,
        )
    } else {
        refine_log(
            interval,
            config.refinements_per_step,
            config.log_basis,
            focus.clamp(interval.min, interval.max),
            include_endpoints,
        )
    };
    debug_assert!(
        children.iter().all(|c| interval.contains_interval(c)),
        "refinement of {interval} escaped its parent: {children:?}"
    );
    children
}

/// Splits `interval` into at most `max_subintervals` equal parts.
///
/// The number of parts is `ceil(len / min_length)` capped at the maximum,
/// where `len` is the relative length when `measure_relative` is set.
/// With `include_endpoints`, two of the parts are replaced by the point
/// intervals at `min` and `max`. An interval already at most `min_length`
/// long is returned whole.
pub fn refine_linear(
    interval: Interval,
    max_subintervals: usize,
    min_length: f64,
    measure_relative: bool,
    include_endpoints: bool,
) -> Vec<Interval> {
    let include_endpoints = include_endpoints && !interval.is_point();
    let relevant = if measure_relative {
        interval.relative_length()
    } else {
        interval.length()
    };

    if relevant <= min_length {
        return with_endpoints(interval, vec![interval], include_endpoints);
    }

    // `as` saturates, so a huge ratio stays bounded by the cap below.
    let wanted = (relevant / min_length).ceil() as usize;
    let cap = if include_endpoints {
        max_subintervals.saturating_sub(2)
    } else {
        max_subintervals
    };
    let parts = wanted.min(cap).max(1);

    let step = interval.length() / parts as f64;
    let mut out = Vec::with_capacity(parts);
    for i in 0..parts {
        let lo = interval.min + i as f64 * step;
        let hi = if i + 1 == parts {
            interval.max
        } else {
            (interval.min + (i + 1) as f64 * step).min(interval.max)
        };
        out.push(Interval::new(lo, hi));
    }
    with_endpoints(interval, out, include_endpoints)
}

/// Splits `interval` into geometrically growing parts around `focus`.
///
/// With `focus` at or outside a boundary the shortest part sits at that
/// boundary and each subsequent part is `basis` times longer. With an
/// interior focus the interval is cut at `focus` and both halves are
/// refined towards it, sharing `num_subintervals` in proportion to their
/// lengths. The count is reduced while the shortest part would fall
/// below [`MIN_LOG_INTERVAL_LENGTH`].
pub fn refine_log(
    interval: Interval,
    num_subintervals: usize,
    basis: f64,
    focus: f64,
    include_endpoints: bool,
) -> Vec<Interval> {
    let include_endpoints = include_endpoints && !interval.is_point();
    let length = interval.length();
    if length <= 0.0 {
        return vec![interval];
    }
    let budget = if include_endpoints {
        num_subintervals.saturating_sub(2)
    } else {
        num_subintervals
    }
    .max(1);

    if focus <= interval.min || focus >= interval.max {
        let parts = geometric_split(interval, budget, basis, focus <= interval.min);
        return with_endpoints(interval, parts, include_endpoints);
    }

    let left_len = focus - interval.min;
    let budget = budget.max(2);
    let left = ((budget as f64 * left_len / length).round() as usize).clamp(1, budget - 1);
    let right = budget - left;

    let mut parts = refine_log(Interval::new(interval.min, focus), left, basis, focus, false);
    parts.extend(refine_log(Interval::new(focus, interval.max), right, basis, focus, false));
    with_endpoints(interval, parts, include_endpoints)
}

fn geometric_split(interval: Interval, n: usize, basis: f64, grow_from_min: bool) -> Vec<Interval> {
    let length = interval.length();
    let mut n = n.max(1);
    let mut shortest = shortest_part(length, basis, n);
    while shortest < MIN_LOG_INTERVAL_LENGTH && n > 1 {
        n -= 1;
        shortest = shortest_part(length, basis, n);
    }

    let mut out = Vec::with_capacity(n);
    let mut part = shortest;
    if grow_from_min {
        let mut start = interval.min;
        for i in 0..n {
            let end = if i + 1 == n {
                interval.max
            } else {
                (start + part).min(interval.max)
            };
            out.push(Interval::new(start, end));
            start = end;
            part *= basis;
        }
    } else {
        let mut end = interval.max;
        for i in 0..n {
            let start = if i + 1 == n {
                interval.min
            } else {
                (end - part).max(interval.min)
            };
            out.push(Interval::new(start, end));
            end = start;
            part *= basis;
        }
        out.reverse();
    }
    out
}

/// Length of the first part when `length` is split into `n` parts
/// growing by `basis`: `length * (1 - b) / (1 - b^n)`.
fn shortest_part(length: f64, basis: f64, n: usize) -> f64 {
    if n <= 1 {
        return length;
    }
    length * (1.0 - basis) / (1.0 - basis.powi(n as i32))
}

fn with_endpoints(interval: Interval, parts: Vec<Interval>, include: bool) -> Vec<Interval> {
    if !include {
        return parts;
    }
    let mut out = Vec::with_capacity(parts.len() + 2);
    out.push(Interval::point(interval.min));
    out.extend(parts);
    out.push(Interval::point(interval.max));
    out
}

/// Splits a categorical domain into singletons, one per admissible value.
///
/// Returns nothing when the parameter is already fixed.
pub fn refine_categorical(domain: &CategoricalDomain, already_set: bool) -> Vec<CategoricalDomain> {
    if already_set {
        return Vec::new();
    }
    domain
        .values
        .iter()
        .map(|v| CategoricalDomain::singleton(v.clone()))
        .collect()
}
