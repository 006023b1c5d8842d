//! Splitting an enriched record into the output views.
//!
//! Every record produces an items-free view (all `952` removed) and a main
//! view. Items owned by the teaching collections are moved out of the main
//! view into one record per collection; a collection without items produces
//! no record.

use crate::enrich::ITEM_TAG;
use crate::mappings::{BJORNHOLT_BRANCH, NYDALEN_BRANCH};
use crate::record::{Field, Record};

/// Ownership subsets split off the main catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subset {
    /// Bjørnholt teaching collection (`fbjl`).
    Bjornholt,
    /// Nydalen teaching collection (`fnyl`).
    Nydalen,
}

impl Subset {
    /// All subsets in output order.
    pub const ALL: [Subset; 2] = [Subset::Bjornholt, Subset::Nydalen];

    /// Owning branch code of the subset.
    #[must_use]
    pub fn branch(self) -> &'static str {
        match self {
            Subset::Bjornholt => BJORNHOLT_BRANCH,
            Subset::Nydalen => NYDALEN_BRANCH,
        }
    }

    /// Short name, used for output file names.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Subset::Bjornholt => "bjornholt",
            Subset::Nydalen => "nydalen",
        }
    }

    fn owns(self, item: &Field) -> bool {
        item.has_subfield_value('a', self.branch())
    }
}

/// The views of one enriched record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    /// The record without any item field.
    pub items_free: Record,
    /// The record with every item not owned by a subset.
    pub main: Record,
    /// One record per subset that owns at least one item, in
    /// [`Subset::ALL`] order. Each carries only that subset's items.
    pub subsets: Vec<(Subset, Record)>,
}

/// Split an enriched record into its output views.
///
/// # Examples
///
/// ```
/// use catmassage::router::{route, Subset};
/// use catmassage::{Field, Leader, Record};
///
/// let mut record = Record::new(Leader::default());
/// for branch in ["hutl", "fnyl"] {
///     record.add_field(Field::builder("952".to_string(), ' ', ' ').subfield_str('a', branch).build());
/// }
///
/// let routed = route(record);
/// assert!(routed.items_free.get_fields("952").is_none());
/// assert_eq!(routed.main.get_fields("952").unwrap().len(), 1);
/// assert_eq!(routed.subsets.len(), 1);
/// assert_eq!(routed.subsets[0].0, Subset::Nydalen);
/// ```
#[must_use]
pub fn route(mut record: Record) -> Routed {
    let mut items_free = record.clone();
    items_free.remove_fields_by_tag(ITEM_TAG);

    let mut subsets = Vec::new();
    for subset in Subset::ALL {
        let owned = record.remove_fields_where(|f| f.tag == ITEM_TAG && subset.owns(f));
        if owned.is_empty() {
            continue;
        }
        let mut view = items_free.clone();
        for item in owned {
            view.add_field(item);
        }
        subsets.push((subset, view));
    }

    Routed {
        items_free,
        main: record,
        subsets,
    }
}
