//! Timestamp to byte offset lookup.

/// One entry of a [`SeekTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPoint {
    /// Byte offset into the emitted payload, without container gaps.
    pub offset: u64,
    /// Physical offset in the container, when the format records it.
    pub position: Option<u64>,
    /// Timestamp in sample frames of the container's time base.
    pub timestamp: u64,
}

/// Seek points kept sorted by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeekTable {
    points: Vec<SeekPoint>,
}

impl SeekTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[SeekPoint] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&SeekPoint> {
        self.points.get(index)
    }

    /// Index of the first point whose timestamp is not less than `timestamp`.
    pub fn search(&self, timestamp: u64) -> usize {
        match self.points.last() {
            Some(last) if last.timestamp < timestamp => self.points.len(),
            _ => self.points.partition_point(|p| p.timestamp < timestamp),
        }
    }

    /// Inserts after any points with the same timestamp.
    pub fn add(&mut self, point: SeekPoint) {
        let index = match self.points.last() {
            Some(last) if last.timestamp <= point.timestamp => self.points.len(),
            _ => self.points.partition_point(|p| p.timestamp <= point.timestamp),
        };
        self.points.insert(index, point);
    }

    pub fn add_point(&mut self, offset: u64, timestamp: u64) {
        self.add(SeekPoint {
            offset,
            position: None,
            timestamp,
        });
    }

    /// The first point at or after `timestamp`.
    pub fn lookup(&self, timestamp: u64) -> Option<SeekPoint> {
        self.points.get(self.search(timestamp)).copied()
    }
}

impl FromIterator<SeekPoint> for SeekTable {
    fn from_iter<T: IntoIterator<Item = SeekPoint>>(iter: T) -> Self {
        let mut table = Self::new();
        for point in iter {
            table.add(point);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_sorted_for_any_insertion_order() {
        let mut table = SeekTable::new();
        let stamps = [40u64, 10, 30, 10, 50, 0, 20, 45, 45, 5];
        for (i, ts) in stamps.iter().enumerate() {
            table.add_point(i as u64, *ts);
            assert!(table.points().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
        assert_eq!(table.len(), stamps.len());
    }

    #[test]
    fn appends_in_order() {
        let table: SeekTable = (0..5)
            .map(|i| SeekPoint {
                offset: i * 100,
                position: Some(i * 100 + 40),
                timestamp: i * 1024,
            })
            .collect();
        assert_eq!(table.search(0), 0);
        assert_eq!(table.search(1024), 1);
        assert_eq!(table.search(1025), 2);
        assert_eq!(table.search(99999), 5);
        assert_eq!(table.lookup(2000).map(|p| p.offset), Some(200));
        assert_eq!(table.lookup(5000), None);
    }
}
