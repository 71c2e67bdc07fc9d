//! Counter field naming and the ordered increment list for one click

use crate::models::{CounterOp, EnrichedEvent, Scope};

/// Number of site-scope values read back into a snapshot
pub fn readback_len(track_ip: bool) -> usize {
    if track_ip {
        7
    } else {
        6
    }
}

/// Lock name serializing every click on the same (site, resource)
pub fn lock_key(event: &EnrichedEvent) -> String {
    format!("{}{}", event.click.site(), event.click.resource())
}

/// Dimension fields shared by the site and global scopes, in counting order
fn dimension_fields(event: &EnrichedEvent, track_ip: bool) -> Vec<String> {
    let mut fields = vec![
        "total".to_string(),
        format!("family:{}", event.browser_family),
        format!("browser:{}", event.browser),
        format!("os:{}", event.os),
        format!("platform:{}", event.platform),
    ];
    if track_ip {
        fields.push(format!("ip:{}", event.click.ip()));
    }
    fields
}

/// Every increment the atomic batch applies for `event`.
///
/// Site-scope ops come first, led by the resource counter, so the first
/// [`readback_len`] results form the snapshot. The global ops mirror the
/// site ops minus the resource counter.
pub fn derive(event: &EnrichedEvent, track_ip: bool) -> Vec<CounterOp> {
    let site = Scope::site(event.click.site());
    let dimensions = dimension_fields(event, track_ip);

    let mut ops = Vec::with_capacity(1 + 2 * dimensions.len());
    ops.push(CounterOp::incr(
        site.clone(),
        format!("uri:{}", event.click.resource()),
    ));
    ops.extend(
        dimensions
            .iter()
            .map(|field| CounterOp::incr(site.clone(), field.clone())),
    );
    ops.extend(
        dimensions
            .into_iter()
            .map(|field| CounterOp::incr(Scope::Global, field)),
    );
    ops
}

/// Best-effort `bot` / `mobile` increments, applied outside the batch
pub fn flag_ops(event: &EnrichedEvent) -> Vec<CounterOp> {
    let site = Scope::site(event.click.site());
    let mut ops = Vec::new();
    for (set, field) in [(event.bot, "bot"), (event.mobile, "mobile")] {
        if set {
            ops.push(CounterOp::incr(site.clone(), field));
            ops.push(CounterOp::incr(Scope::Global, field));
        }
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClickEvent;

    fn event() -> EnrichedEvent {
        let click = ClickEvent::new("example.com", "/blog/post1", "203.0.113.5", "ua").unwrap();
        let mut event = EnrichedEvent::bare(click);
        event.browser_family = "Firefox".to_string();
        event.browser = "Firefox 121.0".to_string();
        event.os = "Windows 10".to_string();
        event.platform = "Windows".to_string();
        event
    }

    fn fields(ops: &[CounterOp]) -> Vec<(String, String)> {
        ops.iter()
            .map(|op| (op.scope.key().to_string(), op.field.clone()))
            .collect()
    }

    #[test]
    fn test_derive_with_ip_tracking() {
        let ops = derive(&event(), true);

        let expected: Vec<(String, String)> = [
            ("example.com", "uri:/blog/post1"),
            ("example.com", "total"),
            ("example.com", "family:Firefox"),
            ("example.com", "browser:Firefox 121.0"),
            ("example.com", "os:Windows 10"),
            ("example.com", "platform:Windows"),
            ("example.com", "ip:203.0.113.5"),
            ("global", "total"),
            ("global", "family:Firefox"),
            ("global", "browser:Firefox 121.0"),
            ("global", "os:Windows 10"),
            ("global", "platform:Windows"),
            ("global", "ip:203.0.113.5"),
        ]
        .iter()
        .map(|(s, f)| (s.to_string(), f.to_string()))
        .collect();

        assert_eq!(fields(&ops), expected);
        assert!(ops.iter().all(|op| op.delta == 1));
    }

    #[test]
    fn test_derive_without_ip_tracking() {
        let ops = derive(&event(), false);

        assert_eq!(ops.len(), 11);
        assert!(ops.iter().all(|op| !op.field.starts_with("ip:")));
        assert_eq!(ops[readback_len(false)].scope, Scope::Global);
    }

    #[test]
    fn test_global_mirrors_site_except_resource() {
        let ops = derive(&event(), true);
        let site: Vec<_> = ops
            .iter()
            .filter(|op| op.scope != Scope::Global)
            .skip(1)
            .map(|op| (&op.field, op.delta))
            .collect();
        let global: Vec<_> = ops
            .iter()
            .filter(|op| op.scope == Scope::Global)
            .map(|op| (&op.field, op.delta))
            .collect();

        assert_eq!(site, global);
        assert!(!ops
            .iter()
            .any(|op| op.scope == Scope::Global && op.field.starts_with("uri:")));
    }

    #[test]
    fn test_flag_ops_only_for_set_flags() {
        let mut event = event();
        assert!(flag_ops(&event).is_empty());

        event.bot = true;
        assert_eq!(
            fields(&flag_ops(&event)),
            vec![
                ("example.com".to_string(), "bot".to_string()),
                ("global".to_string(), "bot".to_string()),
            ]
        );

        event.mobile = true;
        assert_eq!(flag_ops(&event).len(), 4);
    }

    #[test]
    fn test_lock_key_joins_site_and_resource() {
        assert_eq!(lock_key(&event()), "example.com/blog/post1");
    }
}
