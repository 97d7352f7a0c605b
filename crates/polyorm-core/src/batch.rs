use crate::model::EntryRecord;

/// Raw records are converted to typed entities in groups of this size.
pub const MATERIALIZE_CHUNK_SIZE: usize = 100;

///
/// BatchOperation
///
/// Streaming callback for chunked searches. `collect_search_result` decides
/// whether a chunk should also be collected into the final result;
/// `perform_action` consumes the chunk either way.
///

pub trait BatchOperation<T> {
    /// Called once per chunk with the chunk size before any conversion.
    /// Return `false` to process the chunk without collecting it.
    fn collect_search_result(&mut self, size: usize) -> bool;

    fn perform_action(&mut self, entries: Vec<T>);
}

///
/// DefaultBatchOperation
///
/// Collects every chunk and does nothing with it. Used when the caller
/// wants the plain result list.
///

#[derive(Debug, Default)]
pub struct DefaultBatchOperation;

impl<T> BatchOperation<T> for DefaultBatchOperation {
    fn collect_search_result(&mut self, _size: usize) -> bool {
        true
    }

    fn perform_action(&mut self, _entries: Vec<T>) {}
}

/// Convert raw records to typed entities in fixed-size groups.
///
/// Each group of raw records is dropped before the next group converts, so
/// peak memory holds at most one raw group alongside the typed output.
pub fn materialize_in_chunks<I, T, E, F>(records: I, mut convert: F) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = EntryRecord>,
    F: FnMut(EntryRecord) -> Result<T, E>,
{
    let mut records = records.into_iter();
    let mut out = Vec::new();

    loop {
        let chunk: Vec<EntryRecord> = records.by_ref().take(MATERIALIZE_CHUNK_SIZE).collect();
        if chunk.is_empty() {
            return Ok(out);
        }
        for record in chunk {
            out.push(convert(record)?);
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttributeData;

    fn record(n: usize) -> EntryRecord {
        EntryRecord::new(
            format!("inum={n},ou=people,o=org"),
            vec![AttributeData::single("uid", format!("user{n}"))],
        )
    }

    #[test]
    fn converts_all_records_across_chunks() {
        let records: Vec<EntryRecord> = (0..250).map(record).collect();
        let out = materialize_in_chunks(records, |r| {
            Ok::<_, std::convert::Infallible>(r.text_value("uid").unwrap().to_string())
        })
        .unwrap();
        assert_eq!(out.len(), 250);
        assert_eq!(out[0], "user0");
        assert_eq!(out[249], "user249");
    }

    #[test]
    fn pulls_at_most_one_chunk_ahead_of_conversion() {
        use std::{cell::Cell, rc::Rc};

        struct CountingIter {
            next: usize,
            total: usize,
            pulled: Rc<Cell<usize>>,
        }
        impl Iterator for CountingIter {
            type Item = EntryRecord;
            fn next(&mut self) -> Option<EntryRecord> {
                if self.next == self.total {
                    return None;
                }
                self.next += 1;
                self.pulled.set(self.pulled.get() + 1);
                Some(record(self.next))
            }
        }

        let pulled = Rc::new(Cell::new(0));
        let iter = CountingIter {
            next: 0,
            total: 250,
            pulled: pulled.clone(),
        };

        let observed = pulled.clone();
        let mut converted = 0;
        materialize_in_chunks(iter, |r| {
            // each chunk is fully drawn before its first conversion, and the
            // next chunk is not pulled until this one is done
            assert!(
                observed.get() <= (converted / MATERIALIZE_CHUNK_SIZE + 1) * MATERIALIZE_CHUNK_SIZE
            );
            converted += 1;
            Ok::<_, std::convert::Infallible>(r.dn)
        })
        .unwrap();

        assert_eq!(converted, 250);
        assert_eq!(pulled.get(), 250);
    }

    #[test]
    fn conversion_error_stops_early() {
        let records: Vec<EntryRecord> = (0..10).map(record).collect();
        let result = materialize_in_chunks(records, |r| {
            if r.dn.starts_with("inum=5") {
                Err("bad record")
            } else {
                Ok(r.dn)
            }
        });
        assert_eq!(result.unwrap_err(), "bad record");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let out =
            materialize_in_chunks(vec![], |r| Ok::<_, std::convert::Infallible>(r.dn)).unwrap();
        assert!(out.is_empty());
    }
}
