use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ToManhattan,
    ToNewJersey,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::ToManhattan => "NJ → Manhattan",
            Direction::ToNewJersey => "Manhattan → NJ",
        }
    }
}

/// A monitored crossing in one direction. Origin and destination are
/// `lat,lng` pairs on either side of the crossing, chosen so the
/// directions lookup routes through it.
#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub id: &'static str,
    pub name: &'static str,
    pub direction: Direction,
    pub icon: &'static str,
    #[serde(skip)]
    pub origin: &'static str,
    #[serde(skip)]
    pub destination: &'static str,
}

pub static LOCATIONS: [Location; 6] = [
    Location {
        id: "lincoln-nj-ny",
        name: "Lincoln Tunnel",
        direction: Direction::ToManhattan,
        icon: "🚇",
        origin: "40.7657,-74.0270",
        destination: "40.7580,-73.9980",
    },
    Location {
        id: "lincoln-ny-nj",
        name: "Lincoln Tunnel",
        direction: Direction::ToNewJersey,
        icon: "🚇",
        origin: "40.7580,-73.9980",
        destination: "40.7657,-74.0270",
    },
    Location {
        id: "holland-nj-ny",
        name: "Holland Tunnel",
        direction: Direction::ToManhattan,
        icon: "🚇",
        origin: "40.7280,-74.0464",
        destination: "40.7223,-74.0068",
    },
    Location {
        id: "holland-ny-nj",
        name: "Holland Tunnel",
        direction: Direction::ToNewJersey,
        icon: "🚇",
        origin: "40.7223,-74.0068",
        destination: "40.7280,-74.0464",
    },
    Location {
        id: "gwb-nj-ny",
        name: "George Washington Bridge",
        direction: Direction::ToManhattan,
        icon: "🌉",
        origin: "40.8518,-73.9706",
        destination: "40.8468,-73.9370",
    },
    Location {
        id: "gwb-ny-nj",
        name: "George Washington Bridge",
        direction: Direction::ToNewJersey,
        icon: "🌉",
        origin: "40.8468,-73.9370",
        destination: "40.8518,-73.9706",
    },
];

pub fn find_location(id: &str) -> Option<&'static Location> {
    LOCATIONS.iter().find(|location| location.id == id)
}

pub fn is_known_location(id: &str) -> bool {
    find_location(id).is_some()
}
