use std::collections::BTreeMap;

use serde::Serialize;

use crate::constants::{SHOPPING_LIST_FOOTER, SHOPPING_LIST_HEADER};

use super::schema::CartLine;

/// Consolidated shopping list: one line per (ingredient name, unit) pair,
/// amounts summed across every recipe in the cart.
#[derive(Debug, Clone, Serialize)]
pub struct ShoppingList {
    pub lines: Vec<ShoppingListLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingListLine {
    pub name: String,
    pub amount: i64,
    pub measurement_unit: String,
}

impl ShoppingList {
    /// Groups raw cart lines by (name, unit) and sums the amounts. Lines
    /// come out in ascending (name, unit) order, so the rendered document
    /// is deterministic.
    pub fn aggregate(rows: Vec<CartLine>) -> Self {
        let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
        for row in rows {
            *totals
                .entry((row.name, row.measurement_unit))
                .or_insert(0) += i64::from(row.amount);
        }

        let lines = totals
            .into_iter()
            .map(|((name, measurement_unit), amount)| ShoppingListLine {
                name,
                amount,
                measurement_unit,
            })
            .collect();

        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        let mut document = String::from(SHOPPING_LIST_HEADER);

        for line in self.lines.iter() {
            document += &format!(
                "- {}: {} {}\n",
                line.name, line.amount, line.measurement_unit
            );
        }

        document += SHOPPING_LIST_FOOTER;
        document
    }
}

impl From<ShoppingList> for String {
    fn from(list: ShoppingList) -> Self {
        list.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str, unit: &str, amount: i32) -> CartLine {
        CartLine {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    #[test]
    fn amounts_are_summed_per_ingredient() {
        // Cart = {RecipeA (flour:200g, egg:2pcs), RecipeB (flour:100g)}
        let list = ShoppingList::aggregate(vec![
            line("flour", "g", 200),
            line("egg", "pcs", 2),
            line("flour", "g", 100),
        ]);

        assert_eq!(
            list.lines,
            vec![
                ShoppingListLine {
                    name: "egg".to_string(),
                    amount: 2,
                    measurement_unit: "pcs".to_string(),
                },
                ShoppingListLine {
                    name: "flour".to_string(),
                    amount: 300,
                    measurement_unit: "g".to_string(),
                },
            ]
        );
    }

    #[test]
    fn no_ingredient_appears_twice() {
        let list = ShoppingList::aggregate(vec![
            line("flour", "g", 1),
            line("flour", "g", 1),
            line("flour", "g", 1),
        ]);
        assert_eq!(list.lines.len(), 1);
        assert_eq!(list.lines[0].amount, 3);
    }

    #[test]
    fn same_name_different_unit_stays_separate() {
        let list = ShoppingList::aggregate(vec![line("milk", "ml", 500), line("milk", "g", 50)]);
        assert_eq!(list.lines.len(), 2);
    }

    #[test]
    fn rendered_document_has_header_and_footer() {
        let list = ShoppingList::aggregate(vec![line("flour", "g", 300)]);
        let document = list.render();

        assert!(document.starts_with(SHOPPING_LIST_HEADER));
        assert!(document.ends_with(SHOPPING_LIST_FOOTER));
        assert!(document.contains("- flour: 300 g\n"));
    }

    #[test]
    fn empty_cart_renders_empty_list() {
        let list = ShoppingList::aggregate(vec![]);
        assert!(list.is_empty());
        assert_eq!(list.render(), format!("{SHOPPING_LIST_HEADER}{SHOPPING_LIST_FOOTER}"));
    }
}
