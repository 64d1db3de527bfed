use gamewarden_engine::EngineError;

/// Exit status for a failed run: the adapter's own code when the failure came
/// from the game server connection, 1 otherwise.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<EngineError>())
        .map_or(1, EngineError::exit_code)
}
