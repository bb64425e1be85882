pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# CYBERFLOW WORKFLOW CONFIGURATION
# =============================================================================
# A workflow reads records from a source channel, groups them into batches
# (sealed when either batch_size records arrived or time_window seconds
# elapsed), runs each batch through the processing stage, and publishes the
# results to the destination channel.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/cyberflow/workflow.yml
#   3. /etc/cyberflow/workflow.yml
#
# Values may reference environment variables with $env{NAME}.

# Used for log correlation only.
name: my-kafka-workflow

# =============================================================================
# SOURCE
# =============================================================================
# type: kafka | file | memory
#   kafka  - consumer_topics are broker topics (requires the 'kafka' feature)
#   file   - consumer_topics are paths to newline-delimited files
#   memory - in-process channels, only available when embedding the library
source:
  type: kafka
  brokers: kafka:29092
  group_id: cyber-dp
  # Seal a batch as soon as this many records arrived (>= 1)
  batch_size: 1
  consumer_topics:
    - input
  # Seal a batch after this many seconds even if it is not full (> 0)
  time_window: 5

# =============================================================================
# DESTINATION
# =============================================================================
destination:
  type: kafka
  brokers: kafka:29092
  group_id: cyber-dp
  # Number of output records joined into one outbound message
  batch_size: 1
  publisher_topic: cyber-enriched-data
  output_delimiter: ","

# =============================================================================
# PIPELINE (optional)
# =============================================================================
pipeline:
  # pipelined: next window opens while the previous batch is delivered
  # synchronous: deliver each batch before opening the next window
  flush_mode: pipelined
  max_in_flight_batches: 8
  poll_timeout: 1s
  publish_timeout: 10s

# =============================================================================
# RETRY (optional)
# =============================================================================
retry:
  # Consecutive poll failures tolerated before the workflow drains and stops
  source:
    max_retries: 5
    initial_backoff: 200ms
    max_backoff: 5s
  # Re-publish attempts for records the sink did not acknowledge
  sink:
    max_retries: 3
    initial_backoff: 100ms
    max_backoff: 2s
"#
    .to_string()
}
