#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::{ConfigError, ConfigService, KEY_GPU_ENABLE, SECTION_GPU_RESOURCE};

    #[test]
    fn test_callback_fires_on_matching_key() {
        let config = ConfigService::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        config
            .register_callback(
                SECTION_GPU_RESOURCE,
                KEY_GPU_ENABLE,
                "id-0",
                Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        config.set(SECTION_GPU_RESOURCE, KEY_GPU_ENABLE, "false").unwrap();
        config.set(SECTION_GPU_RESOURCE, "cache_capacity", "2").unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_receives_new_value() {
        let config = ConfigService::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        config
            .register_callback(
                SECTION_GPU_RESOURCE,
                KEY_GPU_ENABLE,
                "id-0",
                Box::new(move |value| {
                    sink.lock().unwrap().push(value.to_string());
                    Ok(())
                }),
            )
            .unwrap();

        config.set(SECTION_GPU_RESOURCE, KEY_GPU_ENABLE, "false").unwrap();
        config.set(SECTION_GPU_RESOURCE, KEY_GPU_ENABLE, "true").unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["false", "true"]);
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let config = ConfigService::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        config
            .register_callback(
                SECTION_GPU_RESOURCE,
                KEY_GPU_ENABLE,
                "id-0",
                Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        config.set(SECTION_GPU_RESOURCE, KEY_GPU_ENABLE, "false").unwrap();
        config
            .cancel_callback(SECTION_GPU_RESOURCE, KEY_GPU_ENABLE, "id-0")
            .unwrap();
        config.set(SECTION_GPU_RESOURCE, KEY_GPU_ENABLE, "true").unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(config.callback_count(), 0);
    }

    #[test]
    fn test_cancel_unknown_identity_is_noop() {
        let config = ConfigService::new();
        config
            .cancel_callback(SECTION_GPU_RESOURCE, KEY_GPU_ENABLE, "ghost")
            .unwrap();
    }

    #[test]
    fn test_failing_callback_does_not_poison_set() {
        let config = ConfigService::new();
        let fired = Arc::new(AtomicUsize::new(0));

        config
            .register_callback(
                SECTION_GPU_RESOURCE,
                KEY_GPU_ENABLE,
                "id-bad",
                Box::new(|value| {
                    Err(ConfigError::Internal(format!("cannot apply {value}")))
                }),
            )
            .unwrap();

        let counter = Arc::clone(&fired);
        config
            .register_callback(
                SECTION_GPU_RESOURCE,
                KEY_GPU_ENABLE,
                "id-good",
                Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        // The failing callback is logged; the set succeeds and the other
        // callback still runs.
        config.set(SECTION_GPU_RESOURCE, KEY_GPU_ENABLE, "false").unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(config.get(SECTION_GPU_RESOURCE, KEY_GPU_ENABLE).unwrap(), "false");
    }

    #[test]
    fn test_reregistering_same_identity_replaces() {
        let config = ConfigService::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        config
            .register_callback(
                SECTION_GPU_RESOURCE,
                KEY_GPU_ENABLE,
                "id-0",
                Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        let counter = Arc::clone(&second);
        config
            .register_callback(
                SECTION_GPU_RESOURCE,
                KEY_GPU_ENABLE,
                "id-0",
                Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        config.set(SECTION_GPU_RESOURCE, KEY_GPU_ENABLE, "false").unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(config.callback_count(), 1);
    }
}
