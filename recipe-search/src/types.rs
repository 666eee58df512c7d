//! Core types for recipe queries, adapter output, and ranked candidates.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SearchError;

/// Dietary restriction a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Diet {
    /// No meat or fish.
    Vegetarian,
    /// No animal products at all.
    Vegan,
}

impl Diet {
    /// Returns the lowercase name used by providers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vegetarian => "vegetarian",
            Self::Vegan => "vegan",
        }
    }
}

impl fmt::Display for Diet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Food intolerance a caller can request recipes to be free of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intolerance {
    /// Requires gluten-free recipes.
    Gluten,
    /// Requires dairy-free recipes.
    Dairy,
}

impl Intolerance {
    /// Returns the lowercase name used by providers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gluten => "gluten",
            Self::Dairy => "dairy",
        }
    }
}

impl fmt::Display for Intolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structured filters accompanying a free-text query.
///
/// Every filter is forwarded to the source adapters unchanged. Only
/// `diet`, `intolerances`, `max_ready_time`, and `cuisine` affect scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub diet: Option<Diet>,
    pub intolerances: Vec<Intolerance>,
    pub max_calories: Option<f64>,
    pub max_carbs: Option<f64>,
    pub max_sodium: Option<f64>,
    pub cuisine: Option<String>,
    pub meal_type: Option<String>,
    /// Maximum total preparation time in minutes.
    pub max_ready_time: Option<u32>,
}

/// A free-text query plus structured filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
}

impl SearchQuery {
    /// A query with no filters.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filters: SearchFilters::default(),
        }
    }

    /// Replace the filters on this query.
    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// Per-serving nutrition facts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nutrition {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl Nutrition {
    fn is_valid(&self) -> bool {
        [self.calories, self.protein, self.carbs, self.fat]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Dietary suitability flags reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DietFlags {
    pub vegetarian: bool,
    pub vegan: bool,
    pub gluten_free: bool,
    pub dairy_free: bool,
}

impl DietFlags {
    /// Whether these flags satisfy the requested diet.
    ///
    /// A vegan recipe is vegetarian even when the provider only set the
    /// vegan flag.
    pub fn satisfies(&self, diet: Diet) -> bool {
        match diet {
            Diet::Vegetarian => self.vegetarian || self.vegan,
            Diet::Vegan => self.vegan,
        }
    }

    /// Whether these flags mark the recipe free of the given intolerance.
    pub fn free_of(&self, intolerance: Intolerance) -> bool {
        match intolerance {
            Intolerance::Gluten => self.gluten_free,
            Intolerance::Dairy => self.dairy_free,
        }
    }
}

/// A recipe as returned by a source adapter, already normalised into the
/// shared shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecipe {
    pub title: String,
    pub image: String,
    pub ready_in_minutes: u32,
    pub servings: u32,
    pub summary: String,
    pub ingredients: Vec<String>,
    pub nutrition: Nutrition,
    pub diet: DietFlags,
    pub source_url: String,
    /// Cuisine tags such as "Italian" or "Thai". May be empty.
    pub cuisines: Vec<String>,
    /// Structured instruction steps. Empty when the provider only has prose.
    pub instructions: Vec<String>,
}

impl RawRecipe {
    /// Shorthand for a recipe with only a title set.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Reject records whose numeric fields cannot be trusted.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Source`] when nutrition values are negative
    /// or non-finite.
    pub fn validate(&self) -> Result<(), SearchError> {
        if !self.nutrition.is_valid() {
            return Err(SearchError::Source(format!(
                "malformed nutrition for {:?}",
                self.title
            )));
        }
        Ok(())
    }
}

/// A candidate recipe flowing through the aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Ephemeral identifier, unique only within one search call.
    pub id: u32,
    pub title: String,
    pub image: String,
    pub ready_in_minutes: u32,
    pub servings: u32,
    pub summary: String,
    pub ingredients: Vec<String>,
    pub nutrition: Nutrition,
    pub diet: DietFlags,
    pub source_url: String,
    pub cuisines: Vec<String>,
    pub instructions: Vec<String>,
    /// Name of the source adapter that produced this candidate.
    pub source_name: String,
    /// Trust weight of that source.
    pub source_weight: f64,
    /// `None` until the scoring stage runs; never negative once set.
    pub relevance_score: Option<f64>,
}

impl Recipe {
    /// Tag a raw adapter record with its origin.
    pub fn from_raw(raw: RawRecipe, id: u32, source_name: &str, source_weight: f64) -> Self {
        Self {
            id,
            title: raw.title,
            image: raw.image,
            ready_in_minutes: raw.ready_in_minutes,
            servings: raw.servings,
            summary: raw.summary,
            ingredients: raw.ingredients,
            nutrition: raw.nutrition,
            diet: raw.diet,
            source_url: raw.source_url,
            cuisines: raw.cuisines,
            instructions: raw.instructions,
            source_name: source_name.to_string(),
            source_weight,
            relevance_score: None,
        }
    }
}
