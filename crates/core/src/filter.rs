//! Free-text search over open records.

use crate::record::Record;

/// Case-insensitive substring filter on location and product.
///
/// An empty needle matches everything. Output order follows input order.
pub fn filter<'a, I>(records: I, location: &str, product: &str) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    let location = location.to_lowercase();
    let product = product.to_lowercase();
    records
        .into_iter()
        .filter(|r| {
            contains_folded(&r.key().location, &location)
                && contains_folded(&r.key().product, &product)
        })
        .collect()
}

fn contains_folded(haystack: &str, folded_needle: &str) -> bool {
    folded_needle.is_empty() || haystack.to_lowercase().contains(folded_needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::QuantityBounds;
    use crate::record::RecordKey;
    use rust_decimal::Decimal;
    use time::macros::date;

    fn open_set() -> Vec<Record> {
        [
            ("Austin", "Snacks"),
            ("Mandalay", "Food and beverages"),
            ("Austin", "Electronic accessories"),
            ("Naypyitaw", "Snacks"),
        ]
        .into_iter()
        .map(|(loc, prod)| {
            Record::open(
                RecordKey::new(loc, prod, date!(2019 - 01 - 05)),
                Decimal::from(150),
                40,
                &QuantityBounds::default(),
            )
            .unwrap()
        })
        .collect()
    }

    fn locations<'a>(rs: &[&'a Record]) -> Vec<(&'a str, &'a str)> {
        rs.iter()
            .map(|r| (r.key().location.as_str(), r.key().product.as_str()))
            .collect()
    }

    #[test]
    fn case_insensitive_match() {
        let set = open_set();
        let hits = filter(&set, "aus", "snack");
        assert_eq!(locations(&hits), vec![("Austin", "Snacks")]);
    }

    #[test]
    fn empty_needles_return_everything_in_order() {
        let set = open_set();
        let hits = filter(&set, "", "");
        assert_eq!(hits.len(), set.len());
        for (hit, original) in hits.iter().zip(set.iter()) {
            assert_eq!(*hit, original);
        }
    }

    #[test]
    fn single_field_filter_preserves_order() {
        let set = open_set();
        let hits = filter(&set, "", "SNACKS");
        assert_eq!(
            locations(&hits),
            vec![("Austin", "Snacks"), ("Naypyitaw", "Snacks")]
        );
    }

    #[test]
    fn no_match() {
        let set = open_set();
        assert!(filter(&set, "berlin", "").is_empty());
    }
}
