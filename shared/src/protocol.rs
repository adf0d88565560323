/// Label that opts a container into discovery; its value is the service name
pub const SERVICE_LABEL: &str = "disconter.service";

/// Optional sibling labels overriding the locator record fields
pub const PRIORITY_LABEL: &str = "disconter.service.priority";
pub const WEIGHT_LABEL: &str = "disconter.service.weight";
pub const PORT_LABEL: &str = "disconter.service.port";
pub const TTL_LABEL: &str = "disconter.service.ttl";

pub const DEFAULT_PRIORITY: u16 = 1;
pub const DEFAULT_WEIGHT: u16 = 1;
pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_TTL: u32 = 0;

/// Default DNS zone served by the responder
pub const DEFAULT_ZONE: &str = "disconter";

/// Name segments below the zone
pub const CONTAINER_SEGMENT: &str = "container";
pub const SERVICE_SEGMENT: &str = "service";

/// Runtime state a container must report to be discoverable
pub const RUNNING_STATE: &str = "running";

/// Event actions that change running-state membership
pub const START_ACTION: &str = "start";
pub const DIE_ACTION: &str = "die";
