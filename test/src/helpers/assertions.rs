/// Assert that a client saw an event matching a pattern
#[macro_export]
macro_rules! assert_client_event {
    ($client:expr, $pattern:pat) => {
        assert!(
            $client.events.iter().any(|event| matches!(event, $pattern)),
            "client {} never saw {}; events: {:?}",
            $client.key,
            stringify!($pattern),
            $client.events
        );
    };
}

/// Assert that a client never saw an event matching a pattern
#[macro_export]
macro_rules! assert_no_client_event {
    ($client:expr, $pattern:pat) => {
        assert!(
            !$client.events.iter().any(|event| matches!(event, $pattern)),
            "client {} unexpectedly saw {}",
            $client.key,
            stringify!($pattern)
        );
    };
}
