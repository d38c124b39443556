use serde::{Deserialize, Serialize};

/// Storefront product that can be offered next to a recommendation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub price_inr: u32,
    pub pack_size: String,
}

impl Product {
    pub fn new(name: &str, price_inr: u32, pack_size: &str) -> Self {
        Self {
            name: name.to_string(),
            price_inr,
            pack_size: pack_size.to_string(),
        }
    }
}

/// Product catalog with a name-matching heuristic.
///
/// Matching is case-insensitive substring containment in either direction.
/// It is a heuristic: "Urea" also matches "Neem Coated Urea", and spelling
/// variants ("2,4-D" vs "2 4-D") never match.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    /// Catalog shipped with the storefront.
    pub fn builtin() -> Self {
        Self::new(vec![
            Product::new("Glyphosate 41% SL", 450, "1 L"),
            Product::new("2,4-D Amine Salt 58% SL", 380, "1 L"),
            Product::new("Pendimethalin 30% EC", 520, "1 L"),
            Product::new("Atrazine 50% WP", 310, "500 g"),
            Product::new("Metsulfuron Methyl 20% WP", 120, "8 g"),
            Product::new("Neem Coated Urea", 270, "45 kg"),
            Product::new("DAP", 1350, "50 kg"),
        ])
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// All products whose name contains `treatment`, or is contained in it.
    pub fn matches(&self, treatment: &str) -> Vec<&Product> {
        let needle = treatment.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.products
            .iter()
            .filter(|product| {
                let name = product.name.to_lowercase();
                name.contains(&needle) || needle.contains(&name)
            })
            .collect()
    }

    /// First match in catalog order.
    pub fn best_match(&self, treatment: &str) -> Option<&Product> {
        self.matches(treatment).into_iter().next()
    }
}
