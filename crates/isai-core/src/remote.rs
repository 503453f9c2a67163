//! HTTP implementation of the remote catalog
//!
//! Talks to the storefront's REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::catalog::{ CatalogError, Playlist, RemoteCatalog };
use crate::track::{ Track, TrackId };


const USER_AGENT: &str = concat!( "isai/", env!( "CARGO_PKG_VERSION" ) );


#[derive( Deserialize )]
struct LikeResponse {
    liked: bool,
}


/// REST client for the storefront catalog.
#[derive( Debug, Clone )]
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
}


impl HttpCatalog {
    /// Creates a client for the server at `base_url` (e.g. `http://localhost:8080`).
    pub fn new( base_url: impl Into<String> ) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .user_agent( USER_AGENT )
            .timeout( Duration::from_secs( 15 ) )
            .build()
            .map_err( |e| CatalogError::Request( e.to_string() ) )?;

        let base_url = base_url.into().trim_end_matches( '/' ).to_string();
        Ok( Self { client, base_url } )
    }


    /// Gets the server base URL.
    pub fn base_url( &self ) -> &str {
        &self.base_url
    }


    fn url( &self, path: &str ) -> String {
        format!( "{}{}", self.base_url, path )
    }


    async fn get_json<T: DeserializeOwned>( &self, path: &str ) -> Result<T, CatalogError> {
        let url = self.url( path );
        tracing::debug!( url = %url, "GET" );

        let response = self.client
            .get( &url )
            .send()
            .await
            .map_err( |e| CatalogError::Request( e.to_string() ) )?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err( CatalogError::NotFound( path.to_string() ) );
        }
        if !status.is_success() {
            return Err( CatalogError::Status( status.as_u16() ) );
        }

        response.json()
            .await
            .map_err( |e| CatalogError::Decode( e.to_string() ) )
    }


    async fn put( &self, path: &str ) -> Result<reqwest::Response, CatalogError> {
        let url = self.url( path );
        tracing::debug!( url = %url, "PUT" );

        let response = self.client
            .put( &url )
            .send()
            .await
            .map_err( |e| CatalogError::Request( e.to_string() ) )?;

        let status = response.status();
        if !status.is_success() {
            return Err( CatalogError::Status( status.as_u16() ) );
        }
        Ok( response )
    }
}


#[async_trait]
impl RemoteCatalog for HttpCatalog {
    async fn fetch_track( &self, id: &TrackId ) -> Result<Option<Track>, CatalogError> {
        match self.get_json( &format!( "/api/songs/{}", id ) ).await {
            Ok( track ) => Ok( Some( track ) ),
            Err( CatalogError::NotFound( _ ) ) => Ok( None ),
            Err( e ) => Err( e ),
        }
    }


    async fn record_play( &self, id: &TrackId ) -> Result<(), CatalogError> {
        self.put( &format!( "/api/songs/{}/play", id ) ).await.map( |_| () )
    }


    async fn toggle_like( &self, id: &TrackId ) -> Result<bool, CatalogError> {
        let response = self.put( &format!( "/api/songs/{}/like", id ) ).await?;
        let body: LikeResponse = response.json()
            .await
            .map_err( |e| CatalogError::Decode( e.to_string() ) )?;
        Ok( body.liked )
    }


    async fn list_tracks( &self ) -> Result<Vec<Track>, CatalogError> {
        self.get_json( "/api/songs" ).await
    }


    async fn liked_tracks( &self ) -> Result<Vec<Track>, CatalogError> {
        self.get_json( "/api/songs/liked" ).await
    }


    async fn search( &self, query: &str ) -> Result<Vec<Track>, CatalogError> {
        let url = self.url( "/api/songs/search" );
        tracing::debug!( url = %url, query = %query, "GET" );

        let response = self.client
            .get( &url )
            .query( &[( "q", query )] )
            .send()
            .await
            .map_err( |e| CatalogError::Request( e.to_string() ) )?;

        if !response.status().is_success() {
            return Err( CatalogError::Status( response.status().as_u16() ) );
        }
        response.json()
            .await
            .map_err( |e| CatalogError::Decode( e.to_string() ) )
    }


    async fn playlist( &self, id: &str ) -> Result<Playlist, CatalogError> {
        self.get_json( &format!( "/api/playlists/{}", id.trim() ) ).await
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_client_creation_trims_base() {
        let catalog = HttpCatalog::new( "http://localhost:8080/" ).unwrap();
        assert_eq!( catalog.base_url(), "http://localhost:8080" );
        assert_eq!( catalog.url( "/api/songs/3" ), "http://localhost:8080/api/songs/3" );
    }
}
