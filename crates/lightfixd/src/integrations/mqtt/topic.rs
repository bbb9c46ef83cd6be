/// Device name from a state topic `<base>/<device>`.
///
/// Topics outside `base` or with more levels (`<base>/<device>/set`,
/// `<base>/bridge/state`) yield `None`.
pub fn device_from_topic<'a>(topic: &'a str, base: &str) -> Option<&'a str> {
    let device = topic.strip_prefix(base)?.strip_prefix('/')?;
    if device.is_empty() || device.contains('/') {
        return None;
    }
    Some(device)
}

/// Whether `device` names a group rather than a single light.
pub fn is_group(device: &str, suffix: Option<&str>) -> bool {
    suffix.is_some_and(|suffix| device.ends_with(suffix))
}
