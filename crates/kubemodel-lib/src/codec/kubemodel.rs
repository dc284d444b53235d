//! Binary layouts of the serialized KubeModel types
//!
//! Field order below is the wire layout. New fields go at the end of a
//! struct with the version that introduced them.

use super::{
    decode_versioned, encode_versioned, read_entity_map, read_option, read_seq, write_entity_map,
    write_option, write_seq, BinaryCodec, Reader, Writer,
};
use crate::error::CodecResult;
use crate::model::{
    Cluster, Diagnostic, KubeModelSet, Metadata, Namespace, RequestsLimits, ResourceQuantities,
    Resource, ResourceQuantity, ResourceQuota, ResourceQuotaSpec, ResourceQuotaStatus, StatType,
    Stats, Unit, Window,
};
use tracing::debug;

const V1: u8 = 1;

impl KubeModelSet {
    /// Encode with the schema header and a string table.
    pub fn marshal_binary(&self) -> CodecResult<Vec<u8>> {
        encode_versioned(self, true)
    }

    pub fn unmarshal_binary(data: &[u8]) -> CodecResult<Self> {
        decode_versioned(data)
    }
}

impl BinaryCodec for KubeModelSet {
    fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        w.write_struct(|s| {
            s.field(V1, |w| self.metadata.encode(w))?;
            s.field(V1, |w| self.window.encode(w))?;
            s.field(V1, |w| write_option(w, &self.cluster))?;
            s.field(V1, |w| write_entity_map(w, &self.namespaces))?;
            s.field(V1, |w| write_entity_map(w, &self.resource_quotas))
            // nodes, owners, pods, containers and services are not serialized
        })
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        r.read_struct(|s| {
            let metadata = s.read_required("metadata", Metadata::decode)?;
            let window = s.read_required("window", Window::decode)?;

            let mut kms = KubeModelSet::with_created_at(window.start, window.end, metadata.created_at);
            kms.metadata = metadata;
            kms.cluster = s.read(read_option)?.flatten();
            kms.namespaces = s.read_or_default(read_entity_map)?;
            kms.resource_quotas = s.read_or_default(read_entity_map)?;
            kms.rebuild_indexes();
            Ok(kms)
        })
    }
}

impl BinaryCodec for Metadata {
    fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        w.write_struct(|s| {
            s.field(V1, |w| {
                w.write_time(&self.created_at);
                Ok(())
            })?;
            s.field(V1, |w| {
                w.write_opt_time(&self.completed_at);
                Ok(())
            })?;
            s.field(V1, |w| {
                w.write_u64(self.object_count);
                Ok(())
            })?;
            s.field(V1, |w| w.write_string(self.diagnostic_level.as_str()))?;
            s.field(V1, |w| write_seq(w, &self.diagnostics))
        })
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        r.read_struct(|s| {
            let mut metadata = Metadata::new(s.read_required("createdAt", Reader::read_time)?);
            metadata.completed_at = s.read(Reader::read_opt_time)?.flatten();
            metadata.object_count = s.read_or_default(Reader::read_u64)?;
            metadata.diagnostic_level = s.read_or_default(Reader::read_label_or_default)?;
            metadata.diagnostics = s.read_or_default(read_seq)?;
            Ok(metadata)
        })
    }
}

impl BinaryCodec for Diagnostic {
    fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        w.write_struct(|s| {
            s.field(V1, |w| {
                w.write_time(&self.timestamp);
                Ok(())
            })?;
            s.field(V1, |w| w.write_string(self.level.as_str()))?;
            s.field(V1, |w| w.write_string(&self.message))?;
            s.field(V1, |w| match &self.details {
                Some(details) => {
                    w.write_bool(true);
                    w.write_string_map(details)
                }
                None => {
                    w.write_bool(false);
                    Ok(())
                }
            })
        })
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        r.read_struct(|s| {
            Ok(Diagnostic {
                timestamp: s.read_required("timestamp", Reader::read_time)?,
                level: s.read_or_default(Reader::read_label_or_default)?,
                message: s.read_or_default(Reader::read_string)?,
                details: s
                    .read(|r| {
                        if r.read_bool()? {
                            r.read_string_map().map(Some)
                        } else {
                            Ok(None)
                        }
                    })?
                    .flatten(),
            })
        })
    }
}

impl BinaryCodec for Window {
    fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        w.write_struct(|s| {
            s.field(V1, |w| {
                w.write_time(&self.start);
                Ok(())
            })?;
            s.field(V1, |w| {
                w.write_time(&self.end);
                Ok(())
            })
        })
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        r.read_struct(|s| {
            Ok(Window {
                start: s.read_required("start", Reader::read_time)?,
                end: s.read_required("end", Reader::read_time)?,
            })
        })
    }
}

impl BinaryCodec for Cluster {
    fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        w.write_struct(|s| {
            s.field(V1, |w| w.write_string(&self.uid))?;
            s.field(V1, |w| w.write_string(&self.name))?;
            s.field(V1, |w| w.write_string(self.provider.as_str()))?;
            s.field(V1, |w| w.write_string(&self.account))?;
            s.field(V1, |w| {
                w.write_opt_time(&self.start);
                Ok(())
            })?;
            s.field(V1, |w| {
                w.write_opt_time(&self.end);
                Ok(())
            })
        })
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        r.read_struct(|s| {
            Ok(Cluster {
                uid: s.read_or_default(Reader::read_string)?,
                name: s.read_or_default(Reader::read_string)?,
                provider: s.read_or_default(Reader::read_label_or_default)?,
                account: s.read_or_default(Reader::read_string)?,
                start: s.read(Reader::read_opt_time)?.flatten(),
                end: s.read(Reader::read_opt_time)?.flatten(),
            })
        })
    }
}

impl BinaryCodec for Namespace {
    fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        w.write_struct(|s| {
            s.field(V1, |w| w.write_string(&self.uid))?;
            s.field(V1, |w| w.write_string(&self.cluster_uid))?;
            s.field(V1, |w| w.write_string(&self.name))?;
            s.field(V1, |w| w.write_string_map(&self.labels))?;
            s.field(V1, |w| w.write_string_map(&self.annotations))?;
            s.field(V1, |w| {
                w.write_opt_time(&self.start);
                Ok(())
            })?;
            s.field(V1, |w| {
                w.write_opt_time(&self.end);
                Ok(())
            })
        })
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        r.read_struct(|s| {
            Ok(Namespace {
                uid: s.read_or_default(Reader::read_string)?,
                cluster_uid: s.read_or_default(Reader::read_string)?,
                name: s.read_or_default(Reader::read_string)?,
                labels: s.read_or_default(Reader::read_string_map)?,
                annotations: s.read_or_default(Reader::read_string_map)?,
                start: s.read(Reader::read_opt_time)?.flatten(),
                end: s.read(Reader::read_opt_time)?.flatten(),
            })
        })
    }
}

impl BinaryCodec for ResourceQuota {
    fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        w.write_struct(|s| {
            s.field(V1, |w| w.write_string(&self.uid))?;
            s.field(V1, |w| w.write_string(&self.namespace_uid))?;
            s.field(V1, |w| w.write_string(&self.name))?;
            s.field(V1, |w| self.spec.encode(w))?;
            s.field(V1, |w| self.status.encode(w))?;
            s.field(V1, |w| {
                w.write_opt_time(&self.start);
                Ok(())
            })?;
            s.field(V1, |w| {
                w.write_opt_time(&self.end);
                Ok(())
            })
        })
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        r.read_struct(|s| {
            Ok(ResourceQuota {
                uid: s.read_or_default(Reader::read_string)?,
                namespace_uid: s.read_or_default(Reader::read_string)?,
                name: s.read_or_default(Reader::read_string)?,
                spec: s.read_or_default(ResourceQuotaSpec::decode)?,
                status: s.read_or_default(ResourceQuotaStatus::decode)?,
                start: s.read(Reader::read_opt_time)?.flatten(),
                end: s.read(Reader::read_opt_time)?.flatten(),
            })
        })
    }
}

impl BinaryCodec for ResourceQuotaSpec {
    fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        w.write_struct(|s| s.field(V1, |w| self.hard.encode(w)))
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        r.read_struct(|s| {
            Ok(ResourceQuotaSpec {
                hard: s.read_or_default(RequestsLimits::decode)?,
            })
        })
    }
}

impl BinaryCodec for ResourceQuotaStatus {
    fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        w.write_struct(|s| s.field(V1, |w| self.used.encode(w)))
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        r.read_struct(|s| {
            Ok(ResourceQuotaStatus {
                used: s.read_or_default(RequestsLimits::decode)?,
            })
        })
    }
}

impl BinaryCodec for RequestsLimits {
    fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        w.write_struct(|s| {
            s.field(V1, |w| self.requests.encode(w))?;
            s.field(V1, |w| self.limits.encode(w))
        })
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        r.read_struct(|s| {
            Ok(RequestsLimits {
                requests: s.read_or_default(ResourceQuantities::decode)?,
                limits: s.read_or_default(ResourceQuantities::decode)?,
            })
        })
    }
}

impl BinaryCodec for ResourceQuantities {
    fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        w.write_len(self.len(), "resource quantities")?;
        self.iter().try_for_each(|q| q.encode(w))
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        let len = r.read_len()?;
        let mut quantities = ResourceQuantities::new();
        for _ in 0..len {
            if let Some(quantity) = read_quantity(r)? {
                quantities.insert(quantity);
            }
        }
        Ok(quantities)
    }
}

impl BinaryCodec for ResourceQuantity {
    fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        w.write_struct(|s| {
            s.field(V1, |w| w.write_string(self.resource.as_str()))?;
            s.field(V1, |w| w.write_string(self.unit.as_str()))?;
            s.field(V1, |w| self.values.encode(w))
        })
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        r.read_struct(|s| {
            Ok(ResourceQuantity {
                resource: s.read_required("resource", Reader::read_parsed)?,
                unit: s.read_required("unit", Reader::read_parsed)?,
                values: s.read_or_default(Stats::decode)?,
            })
        })
    }
}

/// Decode a quantity, dropping it when its resource or unit is unknown.
fn read_quantity(r: &mut Reader<'_>) -> CodecResult<Option<ResourceQuantity>> {
    r.read_struct(|s| {
        let resource = s.read_required("resource", Reader::read_known::<Resource>)?;
        let unit = s.read_required("unit", Reader::read_known::<Unit>)?;
        let values = s.read_or_default(Stats::decode)?;
        match (resource, unit) {
            (Some(resource), Some(unit)) => Ok(Some(ResourceQuantity {
                resource,
                unit,
                values,
            })),
            _ => {
                debug!("Skipping resource quantity with unknown resource or unit");
                Ok(None)
            }
        }
    })
}

impl BinaryCodec for Stats {
    fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        w.write_len(self.len(), "stats")?;
        for (stat, value) in self.iter() {
            w.write_string(stat.as_str())?;
            w.write_f64(value);
        }
        Ok(())
    }

    fn decode(r: &mut Reader<'_>) -> CodecResult<Self> {
        let len = r.read_len()?;
        let mut stats = Stats::new();
        for _ in 0..len {
            let stat = r.read_known::<StatType>()?;
            let value = r.read_f64()?;
            match stat {
                Some(stat) => stats.set(stat, value),
                None => debug!(value, "Skipping unknown statistic"),
            }
        }
        Ok(stats)
    }
}
