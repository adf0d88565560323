//! Synthesizes DNS answers from a registry snapshot.
//!
//! Names served under `<zone>.`:
//!
//! ```text
//! <instance>.container.<zone>.         A / ANY  -> address of that instance
//! <service>.service.<zone>.            A / ANY  -> one address per instance of the service
//! <service>.service.<zone>.            SRV      -> one locator per instance, plus its
//! _<service>._tcp.service.<zone>.      SRV         address in the additional section
//! ```

use std::net::Ipv4Addr;
use shared::protocol::{CONTAINER_SEGMENT, SERVICE_SEGMENT};
use shared::types::ServiceInstance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Address,
    Locator,
    Any,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    Address(Ipv4Addr),
    Locator {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub name: String,
    pub ttl: u32,
    pub data: RecordData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answer {
    pub answers: Vec<AnswerRecord>,
    pub additionals: Vec<AnswerRecord>,
}

impl Answer {
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty() && self.additionals.is_empty()
    }
}

/// Whether `query_name` falls under `<zone>.`, ignoring ASCII case
pub fn in_zone(zone: &str, query_name: &str) -> bool {
    let apex = format!("{}.", zone);
    query_name.eq_ignore_ascii_case(&apex) || strip_suffix_ignore_case(query_name, &format!(".{}", apex)).is_some()
}

/// Resolve one question against a snapshot's instances.
///
/// Names are compared ignoring ASCII case on both sides, the zone included.
/// Unmatched names produce an empty answer. Records keep the query name as their
/// owner name and the instance's ttl.
pub fn resolve(zone: &str, query_name: &str, query_type: QueryType, instances: &[ServiceInstance]) -> Answer {
    let mut answer = Answer::default();

    if let Some(instance_name) = strip_segment(query_name, CONTAINER_SEGMENT, zone) {
        if matches!(query_type, QueryType::Address | QueryType::Any) {
            // Duplicate names are not deduplicated upstream; the latest instance wins
            if let Some(instance) = instances.iter().rev().find(|i| i.name.eq_ignore_ascii_case(instance_name)) {
                answer.answers.push(address_record(query_name, instance));
            }
        }
        return answer;
    }

    let Some(service_label) = strip_segment(query_name, SERVICE_SEGMENT, zone) else {
        return answer;
    };

    match query_type {
        QueryType::Address | QueryType::Any => {
            answer.answers.extend(
                instances
                    .iter()
                    .filter(|i| i.service.name.eq_ignore_ascii_case(service_label))
                    .map(|i| address_record(query_name, i)),
            );
        }
        QueryType::Locator => {
            for instance in instances.iter().filter(|i| matches_locator(service_label, &i.service.name)) {
                let target = container_name(zone, &instance.name);
                answer.answers.push(AnswerRecord {
                    name: query_name.to_string(),
                    ttl: instance.service.ttl,
                    data: RecordData::Locator {
                        priority: instance.service.priority,
                        weight: instance.service.weight,
                        port: instance.service.port,
                        target: target.clone(),
                    },
                });
                answer.additionals.push(address_record(&target, instance));
            }
        }
        QueryType::Other => {}
    }

    answer
}

/// `<instance>.container.<zone>` without the trailing dot
pub fn container_name(zone: &str, instance_name: &str) -> String {
    format!("{}.{}.{}", instance_name, CONTAINER_SEGMENT, zone)
}

fn address_record(owner: &str, instance: &ServiceInstance) -> AnswerRecord {
    AnswerRecord {
        name: owner.to_string(),
        ttl: instance.service.ttl,
        data: RecordData::Address(instance.address),
    }
}

/// The label in front of `.<segment>.<zone>.`, if the name has that shape
fn strip_segment<'a>(name: &'a str, segment: &str, zone: &str) -> Option<&'a str> {
    let suffix = format!(".{}.{}.", segment, zone);
    strip_suffix_ignore_case(name, &suffix).filter(|label| !label.is_empty())
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = name.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

/// Plain `<service>` or the `_<service>._tcp` form
fn matches_locator(label: &str, service: &str) -> bool {
    if label.eq_ignore_ascii_case(service) {
        return true;
    }
    label
        .strip_prefix('_')
        .and_then(|rest| strip_suffix_ignore_case(rest, "._tcp"))
        .is_some_and(|name| name.eq_ignore_ascii_case(service))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::ServiceConfig;

    fn instance(name: &str, service: &str, address: [u8; 4], ttl: u32) -> ServiceInstance {
        let mut config = ServiceConfig::new(service);
        config.ttl = ttl;
        ServiceInstance {
            id: format!("id-{}", name),
            name: name.to_string(),
            address: Ipv4Addr::from(address),
            service: config,
        }
    }

    #[test]
    fn test_instance_address_lookup() {
        let instances = vec![instance("web", "web", [10, 0, 0, 5], 30)];

        let answer = resolve("zone", "web.container.zone.", QueryType::Address, &instances);
        assert_eq!(
            answer.answers,
            vec![AnswerRecord {
                name: "web.container.zone.".to_string(),
                ttl: 30,
                data: RecordData::Address(Ipv4Addr::new(10, 0, 0, 5)),
            }]
        );
        assert!(answer.additionals.is_empty());
    }

    #[test]
    fn test_any_type_matches_address_lookups() {
        let instances = vec![instance("web", "web", [10, 0, 0, 5], 0)];

        let answer = resolve("zone", "web.container.zone.", QueryType::Any, &instances);
        assert_eq!(answer.answers.len(), 1);
    }

    #[test]
    fn test_query_name_case_insensitive() {
        let instances = vec![instance("web", "api", [10, 0, 0, 5], 0)];

        let answer = resolve("zone", "WEB.Container.ZONE.", QueryType::Address, &instances);
        assert_eq!(answer.answers.len(), 1);
        assert_eq!(answer.answers[0].name, "WEB.Container.ZONE.");

        let answer = resolve("zone", "API.service.zone.", QueryType::Address, &instances);
        assert_eq!(answer.answers.len(), 1);
    }

    #[test]
    fn test_mixed_case_stored_values() {
        let mut instance = instance("Web", "MyApi", [10, 0, 0, 7], 0);
        instance.service.port = 9000;
        let instances = vec![instance];

        let answer = resolve("Disconter", "Web.container.disconter.", QueryType::Address, &instances);
        assert_eq!(answer.answers.len(), 1);

        let answer = resolve("Disconter", "web.container.Disconter.", QueryType::Address, &instances);
        assert_eq!(answer.answers.len(), 1);

        let answer = resolve("Disconter", "myapi.SERVICE.disconter.", QueryType::Any, &instances);
        assert_eq!(answer.answers.len(), 1);
        assert_eq!(answer.answers[0].data, RecordData::Address(Ipv4Addr::new(10, 0, 0, 7)));

        let answer = resolve("Disconter", "_myapi._TCP.service.disconter.", QueryType::Locator, &instances);
        assert_eq!(answer.answers.len(), 1);
        assert_eq!(answer.additionals.len(), 1);
        assert_eq!(answer.additionals[0].name, "Web.container.Disconter");
    }

    #[test]
    fn test_duplicate_instance_names_latest_wins() {
        let instances = vec![
            instance("web", "web", [10, 0, 0, 1], 0),
            instance("web", "web", [10, 0, 0, 2], 0),
        ];

        let answer = resolve("zone", "web.container.zone.", QueryType::Address, &instances);
        assert_eq!(answer.answers.len(), 1);
        assert_eq!(answer.answers[0].data, RecordData::Address(Ipv4Addr::new(10, 0, 0, 2)));
    }

    #[test]
    fn test_service_fan_out() {
        let instances = vec![
            instance("api-1", "api", [10, 0, 0, 1], 0),
            instance("web", "web", [10, 0, 0, 9], 0),
            instance("api-2", "api", [10, 0, 0, 2], 0),
        ];

        let answer = resolve("zone", "api.service.zone.", QueryType::Address, &instances);
        let addresses: Vec<_> = answer.answers.iter().map(|r| r.data.clone()).collect();
        assert_eq!(
            addresses,
            vec![
                RecordData::Address(Ipv4Addr::new(10, 0, 0, 1)),
                RecordData::Address(Ipv4Addr::new(10, 0, 0, 2)),
            ]
        );
        assert!(answer.answers.iter().all(|r| r.name == "api.service.zone."));
    }

    #[test]
    fn test_locator_with_supplementary_address() {
        let mut web1 = instance("web1", "api", [10, 0, 0, 1], 0);
        web1.service.port = 8080;
        let instances = vec![web1];

        let answer = resolve("zone", "_api._tcp.service.zone.", QueryType::Locator, &instances);
        assert_eq!(
            answer.answers,
            vec![AnswerRecord {
                name: "_api._tcp.service.zone.".to_string(),
                ttl: 0,
                data: RecordData::Locator {
                    priority: 1,
                    weight: 1,
                    port: 8080,
                    target: "web1.container.zone".to_string(),
                },
            }]
        );
        assert_eq!(
            answer.additionals,
            vec![AnswerRecord {
                name: "web1.container.zone".to_string(),
                ttl: 0,
                data: RecordData::Address(Ipv4Addr::new(10, 0, 0, 1)),
            }]
        );
    }

    #[test]
    fn test_locator_plain_service_form() {
        let instances = vec![
            instance("api-1", "api", [10, 0, 0, 1], 5),
            instance("api-2", "api", [10, 0, 0, 2], 5),
        ];

        let answer = resolve("zone", "api.service.zone.", QueryType::Locator, &instances);
        assert_eq!(answer.answers.len(), 2);
        assert_eq!(answer.additionals.len(), 2);
        assert!(answer.answers.iter().chain(&answer.additionals).all(|r| r.ttl == 5));
    }

    #[test]
    fn test_locator_form_not_an_address_name() {
        let instances = vec![instance("web1", "api", [10, 0, 0, 1], 0)];

        let answer = resolve("zone", "_api._tcp.service.zone.", QueryType::Address, &instances);
        assert!(answer.is_empty());
    }

    #[test]
    fn test_wrong_type_for_name() {
        let instances = vec![instance("web", "web", [10, 0, 0, 5], 0)];

        assert!(resolve("zone", "web.container.zone.", QueryType::Locator, &instances).is_empty());
        assert!(resolve("zone", "web.service.zone.", QueryType::Other, &instances).is_empty());
    }

    #[test]
    fn test_no_match_is_empty() {
        let instances = vec![instance("web", "web", [10, 0, 0, 5], 0)];

        assert!(resolve("zone", "web.container.zone.", QueryType::Address, &[]).is_empty());
        assert!(resolve("zone", "db.container.zone.", QueryType::Address, &instances).is_empty());
        assert!(resolve("zone", "db.service.zone.", QueryType::Locator, &instances).is_empty());
        assert!(resolve("zone", "web.container.other.", QueryType::Address, &instances).is_empty());
        assert!(resolve("zone", "container.zone.", QueryType::Address, &instances).is_empty());
    }

    #[test]
    fn test_in_zone() {
        assert!(in_zone("disconter", "web.container.disconter."));
        assert!(in_zone("disconter", "DISCONTER."));
        assert!(!in_zone("disconter", "example.com."));
        assert!(!in_zone("disconter", "notdisconter."));
        assert!(in_zone("Disconter", "web.container.DISCONTER."));
        assert!(!in_zone("disconter", "é."));
    }
}
